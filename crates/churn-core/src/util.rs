use std::time::Instant;

#[inline]
pub fn now_us(start: Instant) -> u64 {
    start.elapsed().as_micros() as u64
}

#[inline]
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[inline]
pub fn clamp01(x: f64) -> f64 {
    if x < 0.0 { 0.0 } else if x > 1.0 { 1.0 } else { x }
}

/// API 响应里的时间戳（UTC，RFC 3339）
pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigmoid_is_symmetric_around_zero() {
        assert_eq!(sigmoid(0.0), 0.5);
        let a = sigmoid(2.5);
        let b = sigmoid(-2.5);
        assert!((a + b - 1.0).abs() < 1e-12);
    }

    #[test]
    fn clamp01_bounds() {
        assert_eq!(clamp01(-0.1), 0.0);
        assert_eq!(clamp01(1.7), 1.0);
        assert_eq!(clamp01(0.25), 0.25);
    }
}
