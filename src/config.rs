/// Application-level constants
pub const APP_NAME: &str = "loanterms";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log filter used when `RUST_LOG` is unset.
/// Pattern hits are `debug`, so the default keeps them quiet.
pub fn default_log_filter() -> String {
    format!("{APP_NAME}=info")
}
