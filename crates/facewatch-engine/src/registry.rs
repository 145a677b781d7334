//! Camera registry trait plus in-memory reference registries.
//!
//! Durable persistence of camera and person records belongs to an
//! external collaborator; these in-memory implementations back tests and
//! embeddings that bring their own storage elsewhere.

use facewatch_core::{PersonIdentity, PersonRegistry, RegistryError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::RwLock;

/// Desired run state of a continuously registered camera. Streams for a
/// camera whose status drops to `Off` terminate at the next loop turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraStatus {
    On,
    Off,
}

/// How to reach a camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CameraTransport {
    LocalDevice { index: u32 },
    NetworkRtsp { user: String, password: String, host: String },
    File { path: PathBuf },
}

/// One registered camera. Owned by the external registry; read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraDescriptor {
    pub camera_id: i32,
    pub transport: CameraTransport,
    pub status: CameraStatus,
}

/// External camera registry.
pub trait CameraRegistry: Send + Sync {
    fn get_by_id(&self, camera_id: i32) -> Result<Option<CameraDescriptor>, RegistryError>;
    fn list(&self) -> Result<Vec<CameraDescriptor>, RegistryError>;
}

/// In-memory camera registry.
#[derive(Default)]
pub struct MemoryCameraRegistry {
    cameras: RwLock<BTreeMap<i32, CameraDescriptor>>,
}

impl MemoryCameraRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, descriptor: CameraDescriptor) {
        self.cameras
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(descriptor.camera_id, descriptor);
    }

    pub fn set_status(&self, camera_id: i32, status: CameraStatus) {
        if let Some(d) = self
            .cameras
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(&camera_id)
        {
            d.status = status;
        }
    }
}

impl CameraRegistry for MemoryCameraRegistry {
    fn get_by_id(&self, camera_id: i32) -> Result<Option<CameraDescriptor>, RegistryError> {
        Ok(self
            .cameras
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&camera_id)
            .cloned())
    }

    fn list(&self) -> Result<Vec<CameraDescriptor>, RegistryError> {
        Ok(self
            .cameras
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect())
    }
}

/// In-memory person registry.
#[derive(Default)]
pub struct MemoryPersonRegistry {
    persons: RwLock<BTreeMap<i32, String>>,
}

impl MemoryPersonRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersonRegistry for MemoryPersonRegistry {
    fn get_all(&self) -> Result<Vec<PersonIdentity>, RegistryError> {
        Ok(self
            .persons
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(&person_id, name)| PersonIdentity {
                person_id,
                name: name.clone(),
            })
            .collect())
    }

    fn create(&self, person: PersonIdentity) -> Result<(), RegistryError> {
        let mut persons = self.persons.write().unwrap_or_else(|e| e.into_inner());
        if persons.contains_key(&person.person_id) {
            return Err(RegistryError::AlreadyExists(person.person_id));
        }
        persons.insert(person.person_id, person.name);
        Ok(())
    }
}
