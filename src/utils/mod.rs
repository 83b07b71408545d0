pub mod time;

/// Human-readable USD price. Sub-dollar tokens keep eight decimals so
/// micro-cap prices stay legible.
pub fn format_price(price: f64) -> String {
    if price.abs() >= 1.0 {
        format!("${:.4}", price)
    } else {
        format!("${:.8}", price)
    }
}

/// Compact rendering for large market figures (volume, market cap).
pub fn format_amount(value: f64) -> String {
    let abs = value.abs();
    if abs >= 1_000_000_000.0 {
        format!("{:.2}B", value / 1_000_000_000.0)
    } else if abs >= 1_000_000.0 {
        format!("{:.2}M", value / 1_000_000.0)
    } else if abs >= 1_000.0 {
        format!("{:.2}K", value / 1_000.0)
    } else {
        format!("{:.2}", value)
    }
}
