use core::fmt::Debug;
use core::future::Future;

use embedded_hal_async::delay::DelayNs;
use futures::future::{select, Either};
use futures::pin_mut;

/// Races `future` against a delay. `Err` carries the timeout that elapsed.
pub(crate) async fn run_with_timeout<F: Future>(
    delay: &mut impl DelayNs,
    ms: u32,
    future: F,
) -> Result<F::Output, u32> {
    let timeout_fut = delay.delay_ms(ms);
    pin_mut!(timeout_fut);
    pin_mut!(future);
    match select(timeout_fut, future).await {
        Either::Left(_) => Err(ms),
        Either::Right((result, _)) => Ok(result),
    }
}

pub(crate) struct DebugBytes<'a>(pub &'a [u8]);

#[cfg(feature = "defmt")]
impl defmt::Format for DebugBytes<'_> {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "[");
        let mut iter = self.0.iter().peekable();
        while let Some(byte) = iter.next() {
            defmt::write!(fmt, "{=u8:02X}", byte);
            if iter.peek().is_some() {
                defmt::write!(fmt, ", ");
            }
        }
        defmt::write!(fmt, "]");
    }
}

impl Debug for DebugBytes<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("[")?;
        let mut iter = self.0.iter().peekable();
        while let Some(byte) = iter.next() {
            write!(f, "{:02X}", byte)?;
            if iter.peek().is_some() {
                write!(f, ", ")?;
            }
        }
        f.write_str("]")
    }
}

/// Logs any `Debug` value, including under defmt.
pub(crate) struct DebugFmt<'a, T: Debug>(pub &'a T);

#[cfg(feature = "defmt")]
impl<T: Debug> defmt::Format for DebugFmt<'_, T> {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{:?}", defmt::Debug2Format(self.0));
    }
}

impl<T: Debug> Debug for DebugFmt<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}
