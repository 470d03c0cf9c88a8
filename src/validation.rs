use std::net::IpAddr;
use std::ops::RangeInclusive;

/// Validates if a given u16 value is a valid port number.
/// By type, the port is already within the 0-65535 range.
/// This function checks that the port is not 0, which is reserved.
pub fn is_valid_port(port: u16) -> Result<(), &'static str> {
    if port > 0 {
        Ok(())
    } else {
        Err("Port number must be greater than 0")
    }
}

/// Validates if a given string is a valid IP address.
pub fn is_valid_ip(ip: &str) -> Result<(), &'static str> {
    ip.parse::<IpAddr>().map(|_| ()).map_err(|_| "Invalid IP address")
}

/// Validates a controller host: an IP address or a plain DNS host name.
pub fn is_valid_host(host: &str) -> Result<(), &'static str> {
    if is_valid_ip(host).is_ok() {
        return Ok(());
    }
    let label_ok = |label: &str| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    };
    if !host.is_empty() && host.len() <= 253 && host.split('.').all(label_ok) {
        Ok(())
    } else {
        Err("Invalid host name")
    }
}

/// Validates if a given string is a valid file path.
pub fn is_valid_path(path: &str) -> Result<(), &'static str> {
    if path.is_empty() {
        return Err("File path cannot be empty");
    }
    if path.contains('\0') {
        return Err("File path cannot contain null bytes");
    }
    Ok(())
}

/// Validates if a given value is within a specified numeric range.
pub fn is_in_range<T: PartialOrd>(value: T, range: RangeInclusive<T>) -> Result<(), &'static str> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err("Value is outside the specified range")
    }
}

/// Validates scan bounds against stage travel limits.
///
/// Requires `min_target <= minus < plus <= max_target`, all finite.
pub fn is_valid_scan_range(
    minus: f64,
    plus: f64,
    min_target: f64,
    max_target: f64,
) -> Result<(), &'static str> {
    if !(minus.is_finite() && plus.is_finite()) {
        return Err("Scan bounds must be finite");
    }
    if minus >= plus {
        return Err("Scan minus bound must be below the plus bound");
    }
    if minus < min_target || plus > max_target {
        return Err("Scan bounds exceed the stage travel limits");
    }
    Ok(())
}

/// Validates that a motion parameter is finite and strictly positive.
pub fn is_positive_finite(value: f64) -> Result<(), &'static str> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err("Value must be finite and greater than 0")
    }
}
