//! Endpoint name normalization.

use crate::Error;
use widestring::U16CString;

/// A validated, normalized named-pipe endpoint identifier.
///
/// Wraps the caller-supplied short name (e.g. `"my-app"`) into the full pipe path
/// (`\\.\pipe\my-app`) once, up front, and rejects names that could never round-trip through
/// `CreateNamedPipeW` (empty, or containing an embedded NUL).
#[derive(Clone, Debug)]
pub(crate) struct EndpointName {
    path: String,
}
impl EndpointName {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, Error> {
        let raw = raw.as_ref();
        if raw.is_empty() || raw.contains('\0') {
            return Err(Error::InvalidName);
        }
        Ok(Self { path: format!(r"\\.\pipe\{raw}") })
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// UTF-16, NUL-terminated, ready for `CreateNamedPipeW`/`CreateFileW`.
    pub fn to_wide(&self) -> U16CString {
        // The constructor already rejected embedded NULs, so this cannot fail.
        U16CString::from_str(&self.path).expect("endpoint path validated NUL-free at construction")
    }
}
