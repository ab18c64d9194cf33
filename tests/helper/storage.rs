//! In-memory discovery storage

use std::sync::Mutex;

use imagewatch::discovery::{DiscoveryInput, Storage, StorageError};

#[derive(Default)]
pub struct InMemoryStorage {
    inputs: Mutex<Vec<DiscoveryInput>>,
}

impl InMemoryStorage {
    pub fn with_input(self, input: DiscoveryInput) -> Self {
        self.write(&input).unwrap();
        self
    }
}

impl Storage for InMemoryStorage {
    fn read_all(&self) -> Result<Vec<DiscoveryInput>, StorageError> {
        Ok(self.inputs.lock().unwrap().clone())
    }

    fn write(&self, input: &DiscoveryInput) -> Result<(), StorageError> {
        let mut inputs = self.inputs.lock().unwrap();
        inputs.retain(|i| !(i.name == input.name && i.instance == input.instance));
        inputs.push(input.clone());
        Ok(())
    }
}
