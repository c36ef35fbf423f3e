//! Web front-end assets, embedded at compile time.

pub const INDEX_HTML: &str = include_str!("../../assets/index.html");
pub const STATS_HTML: &str = include_str!("../../assets/stats.html");
pub const CONFIG_HTML: &str = include_str!("../../assets/config.html");
pub const CONFIG_SAVED_HTML: &str = include_str!("../../assets/config_saved.html");
pub const CONFIG_CANCELED_HTML: &str = include_str!("../../assets/config_canceled.html");
pub const ERROR_MODAL_HTML: &str = include_str!("../../assets/error_modal.html");
pub const STYLE_CSS: &str = include_str!("../../assets/css/style.css");
pub const CHARTS_JS: &str = include_str!("../../assets/js/charts.js");

/// Fill the error modal template.
pub fn render_error_modal(title: &str, message: &str) -> String {
    ERROR_MODAL_HTML
        .replace("{{TITLE}}", title)
        .replace("{{MESSAGE}}", message)
}
