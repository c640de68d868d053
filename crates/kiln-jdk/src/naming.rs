/// Toolchain name for a Java language version: `1.N` below 9, `N` from 9 on.
pub fn toolchain_name_for_version(version: u32) -> String {
    if version < 9 {
        format!("1.{version}")
    } else {
        version.to_string()
    }
}

/// Environment variable that may point at the installation of `name`.
///
/// Dots are dropped, so the legacy `1.8` naming maps to `JDK_18_x64`.
pub fn env_var_for_toolchain(name: &str) -> String {
    format!("JDK_{}_x64", name.replace('.', ""))
}

/// Drop a vendor prefix such as `corretto-` from a referenced toolchain name.
pub fn strip_vendor_prefix(name: &str) -> &str {
    match name.split_once('-') {
        Some((_vendor, rest)) if !rest.is_empty() => rest,
        _ => name,
    }
}
