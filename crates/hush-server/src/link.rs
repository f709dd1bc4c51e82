//! Share links: `<base>/l#<alias>/<key>`.
//!
//! Alias and key live in the fragment, which browsers never send to a
//! server.

use crate::error::{HushError, Result};

/// Build the share link for `alias` and `encryption_key`.
pub fn secret_link(base_url: &str, alias: &str, encryption_key: &str) -> String {
    format!("{}/l#{alias}/{encryption_key}", base_url.trim_end_matches('/'))
}

/// Split a share link into `(alias, encryption_key)`.
///
/// Accepts a full link or just the `alias/key` fragment.
pub fn parse_secret_link(link: &str) -> Result<(String, String)> {
    let link = link.trim();
    let fragment = match link.split_once('#') {
        Some((_, fragment)) => fragment,
        None if !link.contains("://") => link,
        None => {
            return Err(HushError::InvalidInput(
                "link has no #alias/key fragment".into(),
            ))
        }
    };

    match fragment.split_once('/') {
        Some((alias, key)) if !alias.is_empty() && !key.is_empty() && !key.contains('/') => {
            Ok((alias.to_owned(), key.to_owned()))
        }
        _ => Err(HushError::InvalidInput(
            "expected a fragment of the form alias/key".into(),
        )),
    }
}
