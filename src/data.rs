//! Batch and data-loader seams.
//!
//! A composite model trains from batches that bundle one input tensor per
//! component under that component's name; the warm-up driver selects its
//! input by key.

use std::collections::HashMap;

use crate::Tensor;

/// A training batch: named input tensors plus a target tensor.
#[derive(Clone)]
pub struct Batch {
    inputs: HashMap<String, Tensor>,
    /// Target labels/values.
    pub targets: Tensor,
}

impl Batch {
    /// Create a batch from a keyed input bundle.
    pub fn new(inputs: HashMap<String, Tensor>, targets: Tensor) -> Self {
        Self { inputs, targets }
    }

    /// Create a batch with a single named input.
    pub fn single(name: impl Into<String>, input: Tensor, targets: Tensor) -> Self {
        let mut inputs = HashMap::new();
        inputs.insert(name.into(), input);
        Self { inputs, targets }
    }

    /// Look up an input tensor by component name.
    pub fn input(&self, name: &str) -> Option<&Tensor> {
        self.inputs.get(name)
    }

    /// Names of the bundled inputs.
    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.keys().map(String::as_str)
    }

    /// Number of target elements.
    pub fn size(&self) -> usize {
        self.targets.len()
    }
}

/// A finite, restartable source of training batches.
pub trait DataLoader {
    /// Batches per epoch.
    fn len(&self) -> usize;

    /// Whether the loader yields no batches.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate one epoch of batches. Calling again restarts from the top.
    fn batches(&self) -> Box<dyn Iterator<Item = Batch> + '_>;
}

/// Loader over a pre-built vector of batches.
pub struct InMemoryLoader {
    batches: Vec<Batch>,
}

impl InMemoryLoader {
    /// Wrap a vector of batches.
    pub fn new(batches: Vec<Batch>) -> Self {
        Self { batches }
    }
}

impl DataLoader for InMemoryLoader {
    fn len(&self) -> usize {
        self.batches.len()
    }

    fn batches(&self) -> Box<dyn Iterator<Item = Batch> + '_> {
        Box::new(self.batches.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_batch() -> Batch {
        Batch::single(
            "dense",
            Tensor::from_vec(vec![1.0, 2.0, 3.0], false),
            Tensor::from_vec(vec![4.0, 5.0, 6.0], false),
        )
    }

    #[test]
    fn test_batch_keyed_access() {
        let batch = sample_batch();
        assert!(batch.input("dense").is_some());
        assert!(batch.input("wide").is_none());
        assert_eq!(batch.size(), 3);
    }

    #[test]
    fn test_batch_input_names() {
        let batch = sample_batch();
        let names: Vec<&str> = batch.input_names().collect();
        assert_eq!(names, vec!["dense"]);
    }

    #[test]
    fn test_loader_len_and_restart() {
        let loader = InMemoryLoader::new(vec![sample_batch(), sample_batch()]);
        assert_eq!(loader.len(), 2);
        assert!(!loader.is_empty());

        // Two passes over the loader see the same number of batches.
        let first: Vec<Batch> = loader.batches().collect();
        let second: Vec<Batch> = loader.batches().collect();
        assert_eq!(first.len(), second.len());
    }

    #[test]
    fn test_empty_loader() {
        let loader = InMemoryLoader::new(vec![]);
        assert!(loader.is_empty());
        assert_eq!(loader.batches().count(), 0);
    }
}
