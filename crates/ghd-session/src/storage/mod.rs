//! On-disk layout of the session store.
//!
//! ```text
//! <home>/<owner>/<repo>/<issue>/
//!     session.json
//!     .session.lock
//!     messages/
//! ```

pub mod file;
pub mod index;

use std::path::{Path, PathBuf};

pub use index::SessionIndex;

use crate::SessionKey;

pub const SESSION_FILE: &str = "session.json";
pub const SESSION_LOCK: &str = ".session.lock";
pub const MESSAGES_DIR: &str = "messages";

/// Directory holding one session.
#[must_use]
pub fn session_dir(root: &Path, key: &SessionKey) -> PathBuf {
    root.join(&key.owner)
        .join(&key.repo)
        .join(key.issue.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_dir() {
        let key = SessionKey::new("acme", "widgets", 7).unwrap();
        assert_eq!(
            session_dir(Path::new("/store"), &key),
            PathBuf::from("/store/acme/widgets/7")
        );
    }
}
