//! The downstream flush action invoked once per completed group.

use super::errors::EmitError;

/// Action run exactly once per completed group.
///
/// `key` is the parent key of a normal group, or the delayed emit key of a
/// delayed group. `values` are in slot reservation order. Runs on the thread
/// that completed the group, with no committer lock held.
pub trait Emittable<V>: Send + Sync {
    fn execute(&self, key: &str, values: Vec<V>) -> Result<(), EmitError>;
}

impl<V, F> Emittable<V> for F
where
    F: Fn(&str, Vec<V>) -> Result<(), EmitError> + Send + Sync,
{
    fn execute(&self, key: &str, values: Vec<V>) -> Result<(), EmitError> {
        self(key, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        calls: Mutex<Vec<(String, Vec<u32>)>>,
    }

    impl Emittable<u32> for Recorder {
        fn execute(&self, key: &str, values: Vec<u32>) -> Result<(), EmitError> {
            self.calls.lock().unwrap().push((key.to_string(), values));
            Ok(())
        }
    }

    #[test]
    fn test_closure_is_emittable() {
        let emitter = |key: &str, values: Vec<u32>| -> Result<(), EmitError> {
            if values.is_empty() {
                return Err(format!("empty batch for {}", key).into());
            }
            Ok(())
        };

        assert!(emitter.execute("0000", vec![1]).is_ok());
        let err = emitter.execute("0001", vec![]).unwrap_err();
        assert_eq!(err.to_string(), "empty batch for 0001");
    }

    #[test]
    fn test_struct_is_emittable_as_trait_object() {
        let recorder = Recorder { calls: Mutex::new(Vec::new()) };
        {
            let emitter: &dyn Emittable<u32> = &recorder;
            emitter.execute("0000", vec![11, 22]).unwrap();
        }
        assert_eq!(
            recorder.calls.lock().unwrap().as_slice(),
            &[("0000".to_string(), vec![11, 22])]
        );
    }
}
