use crate::config::StorageBackend;
use crate::memory::MemoryBlock;
use crate::session::Session;
use serde::de::{SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::Formatter;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::{fs, io};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SaveStateError {
    #[error("error serializing/deserializing state: {source}")]
    Serialization {
        #[from]
        source: bincode::Error,
    },
    #[error("error reading/writing state: {source}")]
    FileSystem {
        #[from]
        source: io::Error,
    },
    #[error("save state uses {saved} storage, cannot load it into a {requested} session")]
    BackendMismatch { saved: StorageBackend, requested: StorageBackend },
    #[error("save state references memory blocks that it does not contain")]
    DanglingBlock,
    #[error("save state mapper does not match any cartridge layout")]
    InvalidMapperLayout,
}

pub fn serialize_array<S, T, const N: usize>(
    array: &[T; N],
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize,
{
    let mut state = serializer.serialize_tuple(N)?;
    for value in array {
        state.serialize_element(value)?;
    }
    state.end()
}

struct DeserializeArrayVisitor<T, const N: usize> {
    marker: PhantomData<T>,
}

impl<T, const N: usize> DeserializeArrayVisitor<T, N> {
    fn new() -> Self {
        Self { marker: PhantomData }
    }
}

impl<'de, T, const N: usize> Visitor<'de> for DeserializeArrayVisitor<T, N>
where
    T: Deserialize<'de> + Default + Copy,
{
    type Value = [T; N];

    fn expecting(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "an array of size {N}")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut array = [T::default(); N];

        for (i, value) in array.iter_mut().enumerate() {
            let Some(elem) = seq.next_element()? else {
                return Err(de::Error::custom(format!(
                    "expected array to have {N} elements, only got {i}",
                )));
            };

            *value = elem;
        }

        if seq.next_element::<T>()?.is_some() {
            return Err(de::Error::custom(format!("array has more than {N} elements",)));
        }

        Ok(array)
    }
}

pub fn deserialize_array<'de, D, T, const N: usize>(deserializer: D) -> Result<[T; N], D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default + Copy,
{
    deserializer.deserialize_tuple(N, DeserializeArrayVisitor::new())
}

pub fn determine_save_state_path(rom_file_path: &str) -> PathBuf {
    Path::new(rom_file_path).with_extension("ss0")
}

/// Encode a session as the storage backend tag followed by the session itself, so that a loader
/// can reject a mismatched backend before decoding any blocks.
pub fn serialize_session<B: MemoryBlock>(session: &Session<B>) -> Result<Vec<u8>, SaveStateError> {
    let mut bytes = bincode::serialize(&B::BACKEND)?;
    bincode::serialize_into(&mut bytes, session)?;
    Ok(bytes)
}

pub fn deserialize_session<B: MemoryBlock>(bytes: &[u8]) -> Result<Session<B>, SaveStateError> {
    let mut reader: &[u8] = bytes;

    let saved: StorageBackend = bincode::deserialize_from(&mut reader)?;
    if saved != B::BACKEND {
        return Err(SaveStateError::BackendMismatch { saved, requested: B::BACKEND });
    }

    let session: Session<B> = bincode::deserialize_from(&mut reader)?;
    if !reader.is_empty() {
        log::warn!("Ignoring {} trailing bytes after save state", reader.len());
    }

    if !session.blocks_consistent() {
        return Err(SaveStateError::DanglingBlock);
    }
    if !session.mapper_layout_consistent() {
        return Err(SaveStateError::InvalidMapperLayout);
    }

    Ok(session)
}

pub fn save_state<B, P>(session: &Session<B>, path: P) -> Result<(), SaveStateError>
where
    B: MemoryBlock,
    P: AsRef<Path>,
{
    let serialized_state = serialize_session(session)?;
    fs::write(path.as_ref(), serialized_state)?;

    log::info!("Successfully wrote save state to '{}'", path.as_ref().display());

    Ok(())
}

pub fn load_state<B, P>(path: P) -> Result<Session<B>, SaveStateError>
where
    B: MemoryBlock,
    P: AsRef<Path>,
{
    let serialized_state = fs::read(path.as_ref())?;

    let session = deserialize_session(&serialized_state)?;

    log::info!("Successfully loaded save state from '{}'", path.as_ref().display());

    Ok(session)
}
