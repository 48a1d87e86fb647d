use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::signal::Signal;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ButtonEvent {
    Pressed,
    Released { duration_ms: f64 },
}

#[derive(Clone, Copy)]
struct EdgeState {
    pressed: bool,
    last_edge_ms: Option<f64>,
    pressed_at_ms: f64,
}

/// Hand-off between the button interrupt and the main loop.
///
/// `on_edge` is called from the interrupt with the new level. It only
/// debounces and publishes into a single slot; a newer event replaces one
/// the main loop has not taken yet.
pub struct ButtonEdges<M: RawMutex> {
    debounce_ms: f64,
    state: BlockingMutex<M, Cell<EdgeState>>,
    signal: Signal<M, ButtonEvent>,
}

impl<M: RawMutex> ButtonEdges<M> {
    pub const fn new(debounce_ms: f64) -> Self {
        Self {
            debounce_ms,
            state: BlockingMutex::const_new(
                M::INIT,
                Cell::new(EdgeState {
                    pressed: false,
                    last_edge_ms: None,
                    pressed_at_ms: 0.0,
                }),
            ),
            signal: Signal::new(),
        }
    }

    /// Returns whether the edge was honored.
    pub fn on_edge(&self, pressed: bool, now_ms: f64) -> bool {
        let event = self.state.lock(|state| {
            let mut edge = state.get();
            if edge.pressed == pressed {
                return None;
            }
            if let Some(last_edge_ms) = edge.last_edge_ms {
                if now_ms - last_edge_ms < self.debounce_ms {
                    return None;
                }
            }

            edge.pressed = pressed;
            edge.last_edge_ms = Some(now_ms);
            let event = if pressed {
                edge.pressed_at_ms = now_ms;
                ButtonEvent::Pressed
            } else {
                ButtonEvent::Released {
                    duration_ms: now_ms - edge.pressed_at_ms,
                }
            };
            state.set(edge);
            Some(event)
        });

        match event {
            Some(event) => {
                self.signal.signal(event);
                true
            }
            None => false,
        }
    }

    pub fn is_pressed(&self) -> bool {
        self.state.lock(|state| state.get().pressed)
    }

    pub fn take(&self) -> Option<ButtonEvent> {
        self.signal.try_take()
    }

    pub async fn wait(&self) -> ButtonEvent {
        self.signal.wait().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    #[test]
    fn press_and_release() {
        let edges = ButtonEdges::<NoopRawMutex>::new(50.0);
        assert!(edges.on_edge(true, 1000.0));
        assert_eq!(edges.take(), Some(ButtonEvent::Pressed));
        assert!(edges.is_pressed());
        assert!(edges.on_edge(false, 1700.0));
        assert_eq!(
            edges.take(),
            Some(ButtonEvent::Released { duration_ms: 700.0 })
        );
        assert_eq!(edges.take(), None);
    }

    #[test]
    fn bounces_inside_window_are_dropped() {
        let edges = ButtonEdges::<NoopRawMutex>::new(50.0);
        assert!(edges.on_edge(true, 0.0));
        assert!(!edges.on_edge(false, 10.0));
        assert!(!edges.on_edge(true, 20.0));
        assert_eq!(edges.take(), Some(ButtonEvent::Pressed));
        assert_eq!(edges.take(), None);

        assert!(edges.on_edge(false, 50.0));
        assert_eq!(
            edges.take(),
            Some(ButtonEvent::Released { duration_ms: 50.0 })
        );
    }

    #[test]
    fn repeated_level_is_ignored() {
        let edges = ButtonEdges::<NoopRawMutex>::new(50.0);
        assert!(!edges.on_edge(false, 0.0));
        assert!(edges.on_edge(true, 100.0));
        assert!(!edges.on_edge(true, 300.0));
        assert!(edges.is_pressed());
    }

    #[test]
    fn unconsumed_event_is_replaced() {
        let edges = ButtonEdges::<NoopRawMutex>::new(50.0);
        edges.on_edge(true, 0.0);
        edges.on_edge(false, 100.0);
        assert_eq!(
            edges.take(),
            Some(ButtonEvent::Released { duration_ms: 100.0 })
        );
        assert_eq!(edges.take(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_resumes_on_edge() {
        let edges = ButtonEdges::<NoopRawMutex>::new(50.0);
        let press = async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            edges.on_edge(true, 20.0)
        };
        let (event, honored) = tokio::join!(edges.wait(), press);
        assert_eq!(event, ButtonEvent::Pressed);
        assert!(honored);
    }
}
