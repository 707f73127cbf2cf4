//! Expected and installed system image versions.
//!
//! The expected version comes from the `buildargs.gn` file shipped next to the
//! paving image, the installed one from two marker files on the device.

use std::path::Path;

use devtarget_common::version::VersionInfo;
use devtarget_common::{Result, TargetError};

use crate::connection::ConnectionHandle;

/// Build configuration file shipped with a system image.
pub const BUILD_ARGS_FILE: &str = "buildargs.gn";

/// File on device that indicates the installed version.
pub const ON_DEVICE_VERSION_FILE: &str = "/config/build-info/version";

/// File on device that indicates the installed product.
pub const ON_DEVICE_PRODUCT_FILE: &str = "/config/build-info/product";

const PRODUCT_KEY: &str = "build_info_product";
const VERSION_KEY: &str = "build_info_version";

/// Reads the version of the image about to be installed.
pub async fn expected_version(artifact: &Path) -> Result<VersionInfo> {
    let contents = tokio::fs::read_to_string(artifact)
        .await
        .map_err(|e| TargetError::VersionParse {
            artifact: artifact.to_path_buf(),
            contents: String::new(),
            reason: format!("could not read file: {e}"),
        })?;
    parse_build_args(artifact, &contents)
}

/// Extracts the product and version from `key = "value"` lines.
///
/// When a key is assigned more than once the last assignment wins.
pub fn parse_build_args(artifact: &Path, contents: &str) -> Result<VersionInfo> {
    let fail = |reason: &str| TargetError::VersionParse {
        artifact: artifact.to_path_buf(),
        contents: contents.to_string(),
        reason: reason.to_string(),
    };

    if contents.trim().is_empty() {
        return Err(fail("file is empty"));
    }

    let mut product: Option<&str> = None;
    let mut version: Option<&str> = None;
    for line in contents.lines() {
        if let Some(value) = assignment(line, PRODUCT_KEY) {
            product = Some(value);
        }
        if let Some(value) = assignment(line, VERSION_KEY) {
            version = Some(value);
        }
    }

    match (product, version) {
        (Some(product), Some(version)) => Ok(VersionInfo::new(product, version)),
        (None, Some(_)) => Err(fail("missing build_info_product")),
        (Some(_), None) => Err(fail("missing build_info_version")),
        (None, None) => Err(fail("missing build_info_product and build_info_version")),
    }
}

/// The quoted value of `key = "value"` at the start of `line`.
fn assignment<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let quoted = line.strip_prefix(key)?.strip_prefix(" = \"")?;
    let end = quoted.rfind('"')?;
    Some(&quoted[..end])
}

/// Reads the version currently running on the device.
///
/// Read failures are connectivity errors, never a mismatch.
pub async fn installed_version(connection: &ConnectionHandle) -> Result<VersionInfo> {
    let product = connection.read_file(ON_DEVICE_PRODUCT_FILE).await?;
    let version = connection.read_file(ON_DEVICE_VERSION_FILE).await?;
    Ok(VersionInfo::new(product.trim(), version.trim()))
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
