use std::fmt;

/// A `(product, version)` pair describing a system image.
///
/// Two pairs match only if both fields are equal; a device running the right
/// product at a different version is a mismatch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionInfo {
    pub product: String,
    pub version: String,
}

impl VersionInfo {
    pub fn new(product: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            version: version.into(),
        }
    }

    pub fn matches(&self, other: &VersionInfo) -> bool {
        self == other
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.product, self.version)
    }
}
