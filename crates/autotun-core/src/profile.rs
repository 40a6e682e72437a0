// ── Tunnel profile validation ──
//
// Structural check of wg-quick style profile text. The full grammar
// belongs to the backend; here we only refuse text that cannot possibly
// describe a tunnel, and pull out the peer keys the reconciler needs.

use crate::error::ImportError;

/// File extension of a single tunnel profile.
pub const PROFILE_EXTENSION: &str = "conf";

/// File extension of a multi-profile archive.
pub const ARCHIVE_EXTENSION: &str = "zip";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Interface,
    Peer,
    Other,
}

struct Scan {
    interfaces: usize,
    interface_keys: usize,
    peers: usize,
    peer_keys: Vec<String>,
}

fn scan(text: &str) -> Result<Scan, ImportError> {
    let mut scan = Scan {
        interfaces: 0,
        interface_keys: 0,
        peers: 0,
        peer_keys: Vec::new(),
    };
    let mut section = None;

    for (line_no, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }

        if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            section = Some(match header.trim().to_ascii_lowercase().as_str() {
                "interface" => {
                    scan.interfaces += 1;
                    Section::Interface
                }
                "peer" => {
                    scan.peers += 1;
                    Section::Peer
                }
                _ => Section::Other,
            });
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            return Err(ImportError::InvalidFormat {
                reason: format!("line {}: expected 'Key = Value'", line_no + 1),
            });
        };
        let (key, value) = (key.trim(), value.trim());

        match section {
            None => {
                return Err(ImportError::InvalidFormat {
                    reason: format!("line {}: '{key}' outside of any section", line_no + 1),
                });
            }
            Some(Section::Interface) if key.eq_ignore_ascii_case("PrivateKey") && !value.is_empty() => {
                scan.interface_keys += 1;
            }
            Some(Section::Peer) if key.eq_ignore_ascii_case("PublicKey") && !value.is_empty() => {
                scan.peer_keys.push(value.to_owned());
            }
            Some(_) => {}
        }
    }

    Ok(scan)
}

/// Check that `text` has the sections every tunnel profile needs.
///
/// Requires at least one `[Interface]` with a `PrivateKey`, and every
/// `[Peer]` section (at least one) to carry a `PublicKey`.
pub fn validate(text: &str) -> Result<(), ImportError> {
    let scan = scan(text)?;

    if scan.interfaces == 0 {
        return Err(ImportError::InvalidFormat {
            reason: "missing [Interface] section".into(),
        });
    }
    if scan.interface_keys == 0 {
        return Err(ImportError::InvalidFormat {
            reason: "[Interface] has no PrivateKey".into(),
        });
    }
    if scan.peers == 0 {
        return Err(ImportError::InvalidFormat {
            reason: "missing [Peer] section".into(),
        });
    }
    if scan.peer_keys.len() < scan.peers {
        return Err(ImportError::InvalidFormat {
            reason: "[Peer] has no PublicKey".into(),
        });
    }
    Ok(())
}

/// Public keys of every `[Peer]`, in file order. Unparseable text yields none.
pub fn peer_public_keys(text: &str) -> Vec<String> {
    scan(text).map(|s| s.peer_keys).unwrap_or_default()
}

/// Split a file name into stem and lowercase extension.
///
/// `"office.conf"` -> `("office", Some("conf"))`; `"README"` -> `("README", None)`.
/// Directory components are dropped.
pub fn split_file_name(file_name: &str) -> (&str, Option<String>) {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext.to_ascii_lowercase())),
        _ => (base, None),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_profile(peer_key: &str) -> String {
        format!(
            "[Interface]\n\
             PrivateKey = yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=\n\
             Address = 10.0.0.2/32\n\
             DNS = 1.1.1.1\n\
             \n\
             [Peer]\n\
             PublicKey = {peer_key}\n\
             AllowedIPs = 0.0.0.0/0\n\
             Endpoint = vpn.example.net:51820\n"
        )
    }

    #[test]
    fn accepts_minimal_profile() {
        validate(&sample_profile("xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg=")).unwrap();
    }

    #[test]
    fn rejects_missing_peer() {
        let text = "[Interface]\nPrivateKey = abc\n";
        let err = validate(text).unwrap_err();
        assert!(matches!(err, ImportError::InvalidFormat { .. }));
        assert!(err.to_string().contains("[Peer]"));
    }

    #[test]
    fn rejects_missing_interface() {
        let text = "[Peer]\nPublicKey = abc\n";
        assert!(matches!(validate(text), Err(ImportError::InvalidFormat { .. })));
    }

    #[test]
    fn rejects_peer_without_key() {
        let text = "[Interface]\nPrivateKey = a\n[Peer]\nPublicKey = b\n[Peer]\nEndpoint = x:1\n";
        assert!(validate(text).is_err());
    }

    #[test]
    fn rejects_garbage_lines() {
        assert!(validate("this is not a tunnel").is_err());
        assert!(validate("").is_err());
    }

    #[test]
    fn comments_and_case_are_tolerated() {
        let text = "# exported\n[interface]\nprivatekey = a # inline\n\n[PEER]\npublickey = b\n";
        validate(text).unwrap();
        assert_eq!(peer_public_keys(text), vec!["b".to_owned()]);
    }

    #[test]
    fn peer_keys_in_file_order() {
        let text = "[Interface]\nPrivateKey = a\n[Peer]\nPublicKey = one\n[Peer]\nPublicKey = two\n";
        assert_eq!(peer_public_keys(text), vec!["one".to_owned(), "two".to_owned()]);
    }

    #[test]
    fn file_name_splitting() {
        assert_eq!(split_file_name("office.conf"), ("office", Some("conf".into())));
        assert_eq!(split_file_name("dir/Home.CONF"), ("Home", Some("conf".into())));
        assert_eq!(split_file_name("a.b.zip"), ("a.b", Some("zip".into())));
        assert_eq!(split_file_name("README"), ("README", None));
        assert_eq!(split_file_name(".hidden"), (".hidden", None));
    }
}
