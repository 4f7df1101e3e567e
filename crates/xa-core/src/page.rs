use std::{ops::Deref, rc::Rc};

/// A guest frame mapped into local memory.
///
/// The mapping is released when the last clone is dropped.
#[derive(Clone)]
pub struct XaMappedPage(Rc<Box<dyn Deref<Target = [u8]>>>);

impl XaMappedPage {
    /// Creates a new mapped page.
    pub fn new<T>(inner: T) -> Self
    where
        T: Deref<Target = [u8]> + 'static,
    {
        Self(Rc::new(Box::new(inner)))
    }
}

impl Deref for XaMappedPage {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<[u8]> for XaMappedPage {
    fn as_ref(&self) -> &[u8] {
        self.deref()
    }
}

impl std::fmt::Debug for XaMappedPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XaMappedPage")
            .field("len", &self.len())
            .finish()
    }
}
