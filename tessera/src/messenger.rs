/// Receives notifications about newly available tiles.
pub trait Messenger: Send + Sync {
    /// Called once after a whole batch of tiles has been composed and cached.
    fn request_redraw(&self);
}

impl<F: Fn() + Send + Sync> Messenger for F {
    fn request_redraw(&self) {
        self()
    }
}
