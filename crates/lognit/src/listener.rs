//! Callback seam between the push/HTTP layers and whatever consumes events.

/// Receives decoded events, one call per event, in delivery order.
///
/// Calls arrive on threads the caller does not control, so implementations
/// must do their own synchronization.
pub trait RestListener<T>: Send + Sync {
    fn receive(&self, event: T);
}

impl<T, F> RestListener<T> for F
where
    F: Fn(T) + Send + Sync,
{
    fn receive(&self, event: T) {
        self(event)
    }
}
