//! Output shapes accepted by the operation layer.
//!
//! Operations that produce values write them through [`ValueBuffer`], which
//! is implemented for growable vectors (resized to fit) and for fixed views
//! (slices and arrays, which the caller must size). Inputs are always plain
//! slices; a single value is passed with `std::slice::from_ref`.

/// Something values can be read from and written to.
pub trait ValueBuffer<T> {
    /// The values currently held.
    fn values(&self) -> &[T];

    /// `Some(len)` for a fixed view that cannot grow, `None` if the buffer
    /// resizes to whatever it is given.
    fn fixed_len(&self) -> Option<usize>;

    /// Replace the contents. A fixed view has its leading values
    /// overwritten; the operation layer has already checked that they fit.
    fn store(&mut self, values: Vec<T>);
}

impl<T> ValueBuffer<T> for Vec<T> {
    fn values(&self) -> &[T] {
        self
    }

    fn fixed_len(&self) -> Option<usize> {
        None
    }

    fn store(&mut self, values: Vec<T>) {
        *self = values
    }
}

impl<T> ValueBuffer<T> for [T] {
    fn values(&self) -> &[T] {
        self
    }

    fn fixed_len(&self) -> Option<usize> {
        Some(self.len())
    }

    fn store(&mut self, values: Vec<T>) {
        for (slot, value) in self.iter_mut().zip(values) {
            *slot = value
        }
    }
}

impl<T, const N: usize> ValueBuffer<T> for [T; N] {
    fn values(&self) -> &[T] {
        self
    }

    fn fixed_len(&self) -> Option<usize> {
        Some(N)
    }

    fn store(&mut self, values: Vec<T>) {
        self[..].store(values)
    }
}

/// Returns the room a buffer lacks for `needed` values, if any.
pub(crate) fn shortfall<T, B>(buffer: &B, needed: usize) -> Option<usize>
where
    B: ValueBuffer<T> + ?Sized,
{
    buffer.fixed_len().filter(|&len| len < needed)
}
