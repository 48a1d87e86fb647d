use embedded_hal_async::delay::DelayNs;

pub trait Indicator {
    async fn set_enable(&mut self, enable: bool);
}

/// Blinks `times` times, `period_ms` on then `period_ms` off.
pub async fn blink(indicator: &mut impl Indicator, delay: &mut impl DelayNs, times: u32, period_ms: u32) {
    for _ in 0..times {
        indicator.set_enable(true).await;
        delay.delay_ms(period_ms).await;
        indicator.set_enable(false).await;
        delay.delay_ms(period_ms).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{RecordingIndicator, TokioDelay};

    #[tokio::test(start_paused = true)]
    async fn blink_pattern() {
        let mut indicator = RecordingIndicator::default();
        let start = tokio::time::Instant::now();
        blink(&mut indicator, &mut TokioDelay, 3, 100).await;
        assert_eq!(indicator.changes, vec![true, false, true, false, true, false]);
        assert_eq!(start.elapsed().as_millis(), 600);
    }
}
