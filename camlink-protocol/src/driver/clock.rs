pub trait Clock: Clone {
    fn now_ms(&self) -> f64;
}
