//! Lazily opened dataset payloads.
//!
//! A dataset object starts unopened after its sidecar has been read and
//! is opened the first time its data is requested. The opened value
//! is cached for the object's lifetime. Open functions acquire their file
//! handles in local scope, so an error part-way through (for example a size
//! check) always drops the handle before returning.

#[derive(Debug)]
pub(crate) struct Payload<T> {
    value: Option<T>,
}

impl<T> Default for Payload<T> {
    fn default() -> Self {
        Payload::unopened()
    }
}

impl<T> Payload<T> {
    pub(crate) fn unopened() -> Self {
        Payload { value: None }
    }

    pub(crate) fn opened(value: T) -> Self {
        Payload { value: Some(value) }
    }

    pub(crate) fn is_opened(&self) -> bool {
        self.value.is_some()
    }

    /// Return the cached value, running `open` first if needed.
    ///
    /// If `open` fails the payload stays unopened, so a later call retries.
    pub(crate) fn get_or_try_open<E>(
        &mut self,
        open: impl FnOnce() -> Result<T, E>,
    ) -> Result<&mut T, E> {
        let value = match self.value.take() {
            Some(value) => value,
            None => open()?,
        };
        Ok(self.value.insert(value))
    }

    /// Drop the cached value.
    pub(crate) fn close(&mut self) {
        self.value = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_once_and_caches() {
        let mut payload: Payload<u32> = Payload::default();
        let mut calls = 0;

        for _ in 0..3 {
            let v = payload
                .get_or_try_open(|| {
                    calls += 1;
                    Ok::<_, ()>(7)
                })
                .unwrap();
            assert_eq!(*v, 7);
        }
        assert_eq!(calls, 1);
        assert!(payload.is_opened());

        payload.close();
        assert!(!payload.is_opened());
    }

    #[test]
    fn failed_open_stays_unopened() {
        let mut payload: Payload<u32> = Payload::default();
        let err = payload.get_or_try_open(|| Err("boom")).unwrap_err();
        assert_eq!(err, "boom");
        assert!(!payload.is_opened());

        let v = payload.get_or_try_open(|| Ok::<_, &str>(3)).unwrap();
        assert_eq!(*v, 3);
    }
}
