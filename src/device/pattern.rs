//! Vendor/product identifier matching

use std::fmt;

use crate::error::PatternError;

use super::UsbDevice;

/// Identifies the watched token by USB vendor and product id.
///
/// Identifiers are stored as four lowercase hex digits, so comparison is
/// case-insensitive regardless of how they were written (`VID_1050`,
/// `0x1050`, `1050`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DevicePattern {
    vendor_id: String,
    product_id: String,
}

impl DevicePattern {
    /// Parse a pattern from user-supplied vendor and product identifiers
    pub fn parse(vendor: &str, product: &str) -> Result<Self, PatternError> {
        let vendor_id = normalize_hex(vendor, "VID_")
            .ok_or_else(|| PatternError::InvalidVendor(vendor.to_string()))?;
        let product_id = normalize_hex(product, "PID_")
            .ok_or_else(|| PatternError::InvalidProduct(product.to_string()))?;
        Ok(Self { vendor_id, product_id })
    }

    pub fn vendor_id(&self) -> &str {
        &self.vendor_id
    }

    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    /// Check identifiers as reported by the platform
    pub fn matches_ids(&self, vendor: &str, product: &str) -> bool {
        self.vendor_id.eq_ignore_ascii_case(vendor.trim())
            && self.product_id.eq_ignore_ascii_case(product.trim())
    }

    pub fn matches(&self, device: &UsbDevice) -> bool {
        self.matches_ids(&device.vendor_id, &device.product_id)
    }

    /// Vendor id in the persisted `VID_XXXX` form
    pub fn vid_label(&self) -> String {
        format!("VID_{}", self.vendor_id.to_ascii_uppercase())
    }

    /// Product id in the persisted `PID_XXXX` form
    pub fn pid_label(&self) -> String {
        format!("PID_{}", self.product_id.to_ascii_uppercase())
    }
}

impl fmt::Display for DevicePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}&{}", self.vid_label(), self.pid_label())
    }
}

fn normalize_hex(raw: &str, prefix: &str) -> Option<String> {
    let trimmed = raw.trim();
    let digits = match trimmed.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => &trimmed[prefix.len()..],
        _ => trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed),
    };

    if digits.len() == 4 && digits.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(digits.to_ascii_lowercase())
    } else {
        None
    }
}
