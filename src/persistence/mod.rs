//! Persistence layer for saving and loading indexes.
//!
//! The on-disk layout is a 24-byte versioned header followed by a bincode
//! snapshot of the index state; the header carries a CRC32 of the snapshot
//! (see [`format`]). `HnswIndex` and `PqIndex` implement [`Persistable`] in
//! this version; the remaining kinds do not persist yet.

mod format;

pub use format::{FileHeader, IndexType, FORMAT_VERSION, MAGIC};

use crate::error::{ForgeAnnError, Result};
use crate::index::hnsw::{HnswConfig, HnswGraph, HnswIndex, HnswNode};
use crate::index::pq::{PqConfig, PqIndex};
use crate::pq::ProductQuantizer;
use crate::store::VectorStore;
use crate::types::Label;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Trait for index types that can be persisted to disk.
pub trait Persistable: Sized {
    /// Save the index to a file.
    ///
    /// # Errors
    /// I/O or serialization failures.
    fn save(&self, path: impl AsRef<Path>) -> Result<()>;

    /// Load an index from a file.
    ///
    /// # Errors
    /// I/O failures, corrupt or mismatched headers, checksum failures.
    fn load(path: impl AsRef<Path>) -> Result<Self>;
}

/// Verify the file header and return the data section.
fn verify_header(data: &[u8], expected_type: IndexType) -> Result<&[u8]> {
    if data.len() < FileHeader::SIZE {
        return Err(ForgeAnnError::invalid_format("file too small for header"));
    }

    let header = FileHeader::from_bytes(&data[..FileHeader::SIZE])?;
    header.verify(expected_type)?;

    let data_section = &data[FileHeader::SIZE..];
    let computed_checksum = crc32fast::hash(data_section);
    if computed_checksum != header.checksum {
        return Err(ForgeAnnError::ChecksumMismatch);
    }

    Ok(data_section)
}

/// Write header and data to a file.
fn write_with_header(path: impl AsRef<Path>, index_type: IndexType, data: &[u8]) -> Result<()> {
    use std::io::Write;

    let checksum = crc32fast::hash(data);
    let header = FileHeader::new(index_type, checksum);

    let mut file = std::fs::File::create(path)?;
    file.write_all(&header.to_bytes())?;
    file.write_all(data)?;
    file.sync_all()?;

    Ok(())
}

/// Rebuild a store from a snapshot's rows.
fn restore_store(
    dim: usize,
    capacity: usize,
    labels: &[i32],
    vectors: &[f32],
) -> Result<VectorStore> {
    let mut store = VectorStore::new(dim, capacity)?;
    for (i, &label) in labels.iter().enumerate() {
        store.add(Label::new(label), &vectors[i * dim..(i + 1) * dim])?;
    }
    Ok(store)
}

// =============================================================================
// HNSW
// =============================================================================

#[derive(Serialize, Deserialize)]
struct HnswSnapshot {
    config: HnswConfig,
    dim: usize,
    capacity: usize,
    labels: Vec<i32>,
    vectors: Vec<f32>,
    levels: Vec<usize>,
    /// Adjacency per node per level.
    neighbors: Vec<Vec<Vec<u32>>>,
    entry_point: i64,
}

impl Persistable for HnswIndex {
    fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let graph = self.graph().read();
        let size = graph.store.len();
        let dim = graph.store.dim();

        let mut labels = Vec::with_capacity(size);
        let mut vectors = Vec::with_capacity(size * dim);
        for i in 0..size {
            labels.push(graph.store.label(i).as_i32());
            if let Some(row) = graph.store.get(i) {
                vectors.extend_from_slice(row);
            }
        }

        let snapshot = HnswSnapshot {
            config: self.config().clone(),
            dim,
            capacity: graph.store.capacity(),
            labels,
            vectors,
            levels: graph.nodes.iter().map(|n| n.level).collect(),
            neighbors: graph
                .nodes
                .iter()
                .map(|n| n.neighbors.iter().map(|l| l.to_vec()).collect())
                .collect(),
            entry_point: self.entry_point_raw(),
        };

        let data = bincode::serialize(&snapshot)?;
        write_with_header(path, IndexType::Hnsw, &data)
    }

    fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let data = verify_header(&bytes, IndexType::Hnsw)?;
        let snapshot: HnswSnapshot = bincode::deserialize(data)?;

        if snapshot.labels.len() != snapshot.levels.len()
            || snapshot.labels.len() != snapshot.neighbors.len()
        {
            return Err(ForgeAnnError::invalid_format(
                "snapshot arrays disagree on element count",
            ));
        }

        let store = restore_store(
            snapshot.dim,
            snapshot.capacity,
            &snapshot.labels,
            &snapshot.vectors,
        )?;

        let nodes: Vec<HnswNode> = snapshot
            .levels
            .iter()
            .zip(snapshot.neighbors.iter())
            .map(|(&level, lists)| HnswNode {
                level,
                neighbors: lists.iter().map(|l| l.iter().copied().collect()).collect(),
            })
            .collect();

        let size = nodes.len();
        Ok(HnswIndex::restore(
            snapshot.config,
            HnswGraph { store, nodes },
            snapshot.entry_point,
            size,
        ))
    }
}

// =============================================================================
// PQ
// =============================================================================

#[derive(Serialize, Deserialize)]
struct PqSnapshot {
    config: PqConfig,
    dim: usize,
    capacity: usize,
    labels: Vec<i32>,
    vectors: Vec<f32>,
    codes: Vec<u8>,
    codebooks: Option<Vec<f32>>,
}

impl Persistable for PqIndex {
    fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let (config, store, quantizer, codes) = self.parts();
        let size = store.len();
        let dim = store.dim();

        let mut labels = Vec::with_capacity(size);
        let mut vectors = Vec::with_capacity(size * dim);
        for i in 0..size {
            labels.push(store.label(i).as_i32());
            if let Some(row) = store.get(i) {
                vectors.extend_from_slice(row);
            }
        }

        let snapshot = PqSnapshot {
            config: config.clone(),
            dim,
            capacity: store.capacity(),
            labels,
            vectors,
            codes: codes.to_vec(),
            codebooks: quantizer.map(|q| q.codebooks().to_vec()),
        };

        let data = bincode::serialize(&snapshot)?;
        write_with_header(path, IndexType::Pq, &data)
    }

    fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let data = verify_header(&bytes, IndexType::Pq)?;
        let snapshot: PqSnapshot = bincode::deserialize(data)?;

        let store = restore_store(
            snapshot.dim,
            snapshot.capacity,
            &snapshot.labels,
            &snapshot.vectors,
        )?;

        let quantizer = snapshot
            .codebooks
            .map(|books| {
                ProductQuantizer::from_parts(
                    books,
                    snapshot.dim,
                    snapshot.config.m,
                    1usize << snapshot.config.n_bits,
                )
            })
            .transpose()?;

        Ok(PqIndex::restore(
            snapshot.config,
            store,
            quantizer,
            snapshot.codes,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::AnnIndex;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_data(n: usize, dim: usize, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n * dim).map(|_| rng.gen_range(-1.0..1.0)).collect()
    }

    #[test]
    fn test_hnsw_roundtrip() {
        let dim = 16;
        let data = random_data(120, dim, 71);
        let index = HnswIndex::new(dim, 150).unwrap();
        for i in 0..120 {
            index
                .add(Label::new(i as i32), &data[i * dim..(i + 1) * dim])
                .unwrap();
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.fann");
        index.save(&path).unwrap();

        let loaded = HnswIndex::load(&path).unwrap();
        assert_eq!(loaded.len(), 120);
        assert_eq!(loaded.dimension(), dim);

        // The loaded graph answers queries identically.
        for i in (0..120).step_by(13) {
            let query = &data[i * dim..(i + 1) * dim];
            let a = index.search(query, 5);
            let b = loaded.search(query, 5);
            assert_eq!(a.len(), b.len());
            for (x, y) in a.iter().zip(b.iter()) {
                assert_eq!(x.label, y.label);
            }
        }
    }

    #[test]
    fn test_pq_roundtrip() {
        let dim = 32;
        let data = random_data(200, dim, 73);
        let mut index = PqIndex::new(dim, 200).unwrap();
        index.train(&data).unwrap();
        for i in 0..200 {
            index
                .add(Label::new(i as i32), &data[i * dim..(i + 1) * dim])
                .unwrap();
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.fann");
        index.save(&path).unwrap();

        let loaded = PqIndex::load(&path).unwrap();
        assert!(loaded.is_trained());
        assert_eq!(loaded.len(), 200);

        for i in (0..200).step_by(17) {
            let query = &data[i * dim..(i + 1) * dim];
            let a = index.search(query, 5);
            let b = loaded.search(query, 5);
            for (x, y) in a.iter().zip(b.iter()) {
                assert_eq!(x.label, y.label);
                assert!((x.distance - y.distance).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_corrupted_file_rejected() {
        let dim = 16;
        let data = random_data(50, dim, 75);
        let index = HnswIndex::new(dim, 50).unwrap();
        for i in 0..50 {
            index
                .add(Label::new(i as i32), &data[i * dim..(i + 1) * dim])
                .unwrap();
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.fann");
        index.save(&path).unwrap();

        // Flip a byte in the data section
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let err = HnswIndex::load(&path).unwrap_err();
        assert!(matches!(err, ForgeAnnError::ChecksumMismatch));
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let dim = 16;
        let data = random_data(64, dim, 77);
        let mut index = PqIndex::new(dim, 64).unwrap();
        index.train(&data).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.fann");
        index.save(&path).unwrap();

        assert!(HnswIndex::load(&path).is_err());
    }
}
