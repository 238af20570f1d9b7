//! On-disk cache for arborescences and the CMSA.
//!
//! Layout under the cache directory:
//!
//! ```text
//! <dir>/cmsa.csv          N x N CMSA values
//! <dir>/msas/<root>.csv   N x N 0/1 indicator matrix of one arborescence
//! ```
//!
//! Files are headerless comma-separated rows, one matrix row per line.

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::arborescence::cmsa::{Cmsa, CmsaWeighting};
use crate::arborescence::edmonds::{find_msa, Arborescence};
use crate::error::{Result, SolverError};
use crate::graph::{edges_to_matrix, matrix_to_edges, Digraph};
use crate::instance::DistanceMatrix;

/// Reads a headerless CSV file of numbers into rows.
pub fn read_matrix<P: AsRef<Path>>(path: P) -> Result<Vec<Vec<f64>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path.as_ref())?;

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let row = record
            .iter()
            .map(|field| {
                field.parse::<f64>().map_err(|_| SolverError::Parse {
                    line: index + 1,
                    message: format!("'{}' is not a number in {}", field, path.as_ref().display()),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        rows.push(row);
    }
    Ok(rows)
}

/// Writes rows as a headerless CSV file.
pub fn write_matrix<P: AsRef<Path>>(path: P, rows: &[Vec<f64>]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    for row in rows {
        writer.write_record(row.iter().map(|v| v.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

fn is_square(rows: &[Vec<f64>], size: usize) -> bool {
    rows.len() == size && rows.iter().all(|r| r.len() == size)
}

/// Cache directory holding one instance's arborescences and CMSA.
#[derive(Debug, Clone)]
pub struct CmsaStore {
    dir: PathBuf,
}

impl CmsaStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        CmsaStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn cmsa_path(&self) -> PathBuf {
        self.dir.join("cmsa.csv")
    }

    pub fn msa_path(&self, root: usize) -> PathBuf {
        self.dir.join("msas").join(format!("{}.csv", root))
    }

    /// Reads `cmsa.csv` if present. A file whose shape does not match `size`
    /// is reported as a dimension mismatch.
    pub fn load(&self, size: usize) -> Result<Option<Cmsa>> {
        let path = self.cmsa_path();
        if !path.exists() {
            return Ok(None);
        }
        let rows = read_matrix(&path)?;
        if !is_square(&rows, size) {
            let found = if rows.len() != size {
                rows.len()
            } else {
                rows.iter().map(Vec::len).find(|&width| width != size).unwrap_or(size)
            };
            return Err(SolverError::DimensionMismatch { expected: size, found });
        }
        Cmsa::from_matrix(&rows).map(Some)
    }

    /// Writes the CMSA and every arborescence it was built from.
    pub fn save(&self, cmsa: &Cmsa) -> Result<()> {
        fs::create_dir_all(self.dir.join("msas"))?;
        write_matrix(self.cmsa_path(), &cmsa.to_rows())?;
        for arborescence in cmsa.arborescences() {
            self.save_arborescence(arborescence, cmsa.size())?;
        }
        Ok(())
    }

    fn save_arborescence(&self, arborescence: &Arborescence, size: usize) -> Result<()> {
        write_matrix(
            self.msa_path(arborescence.root()),
            &edges_to_matrix(arborescence.edges(), size),
        )
    }

    /// Reads a cached arborescence. Missing, unreadable or structurally
    /// invalid files yield `None` so the caller recomputes them.
    fn load_arborescence(&self, root: usize, distances: &DistanceMatrix) -> Option<Arborescence> {
        let path = self.msa_path(root);
        if !path.exists() {
            return None;
        }
        let size = distances.size();
        match read_matrix(&path) {
            Ok(rows) if is_square(&rows, size) => {
                let arborescence = Arborescence::from_edges(root, matrix_to_edges(&rows), distances);
                if arborescence.is_valid(size) && arborescence.root() == root {
                    Some(arborescence)
                } else {
                    log::warn!("{} is not a valid arborescence, recomputing", path.display());
                    None
                }
            }
            Ok(_) => {
                log::warn!("{} does not have {} rows of {} values, recomputing", path.display(), size, size);
                None
            }
            Err(e) => {
                log::warn!("failed to read {}: {}, recomputing", path.display(), e);
                None
            }
        }
    }

    /// Reuses every cached arborescence, computes the missing ones in
    /// parallel, then rewrites the cache.
    pub fn load_or_build(&self, distances: &DistanceMatrix, weighting: CmsaWeighting) -> Result<Cmsa> {
        let n = distances.size();
        let cached: Vec<Option<Arborescence>> = (0..n)
            .map(|root| self.load_arborescence(root, distances))
            .collect();
        let missing: Vec<usize> = (0..n).filter(|&r| cached[r].is_none()).collect();

        log::info!(
            "CMSA cache {}: {} of {} arborescences cached",
            self.dir.display(),
            n - missing.len(),
            n
        );

        let computed: Vec<Arborescence> = if missing.is_empty() {
            Vec::new()
        } else {
            let graph = Digraph::from_matrix(distances);
            missing
                .par_iter()
                .map(|&root| find_msa(&graph, root))
                .collect::<Result<Vec<_>>>()?
        };
        let mut computed = computed.into_iter();

        let arborescences = cached
            .into_iter()
            .map(|slot| slot.or_else(|| computed.next()))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| SolverError::InvalidMatrix("arborescence cache is incomplete".to_string()))?;

        let cmsa = Cmsa::from_arborescences(n, arborescences, weighting)?;

        fs::create_dir_all(self.dir.join("msas"))?;
        for &root in &missing {
            self.save_arborescence(&cmsa.arborescences()[root], n)?;
        }
        write_matrix(self.cmsa_path(), &cmsa.to_rows())?;

        Ok(cmsa)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn matrix() -> DistanceMatrix {
        DistanceMatrix::from_rows(&[
            vec![0.0, 3.0, 1.0, 7.0],
            vec![2.0, 0.0, 6.0, 1.0],
            vec![1.0, 8.0, 0.0, 4.0],
            vec![5.0, 1.0, 2.0, 0.0],
        ])
        .unwrap()
    }

    #[test]
    fn test_matrix_csv_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("m.csv");
        let rows = vec![vec![0.0, 1.5], vec![2.25, 0.0]];
        write_matrix(&path, &rows).unwrap();
        assert_eq!(read_matrix(&path).unwrap(), rows);
    }

    #[test]
    fn test_read_matrix_rejects_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, "1,2\n3,x\n").unwrap();
        assert!(matches!(
            read_matrix(&path),
            Err(SolverError::Parse { line: 2, .. })
        ));
    }

    #[test]
    fn test_load_or_build_matches_direct_build() {
        let dir = tempdir().unwrap();
        let store = CmsaStore::new(dir.path());
        let m = matrix();

        let built = store.load_or_build(&m, CmsaWeighting::Count).unwrap();
        assert_eq!(built, Cmsa::build(&m).unwrap());
        assert!(store.cmsa_path().exists());
        assert!(store.msa_path(3).exists());

        // Second call is served from the cache.
        let cached = store.load_or_build(&m, CmsaWeighting::Count).unwrap();
        assert_eq!(cached.to_rows(), built.to_rows());

        let loaded = store.load(4).unwrap().unwrap();
        assert_eq!(loaded.to_rows(), built.to_rows());
    }

    #[test]
    fn test_corrupt_arborescence_is_recomputed() {
        let dir = tempdir().unwrap();
        let store = CmsaStore::new(dir.path());
        let m = matrix();
        let built = store.load_or_build(&m, CmsaWeighting::Count).unwrap();

        fs::write(store.msa_path(1), "1,1\n1,1\n").unwrap();
        let rebuilt = store.load_or_build(&m, CmsaWeighting::Count).unwrap();
        assert_eq!(rebuilt.to_rows(), built.to_rows());
        assert_eq!(read_matrix(store.msa_path(1)).unwrap().len(), 4);
    }

    #[test]
    fn test_load_detects_wrong_dimension() {
        let dir = tempdir().unwrap();
        let store = CmsaStore::new(dir.path());
        store.save(&Cmsa::build(&matrix()).unwrap()).unwrap();
        assert!(store.load(4).unwrap().is_some());
        assert!(matches!(
            store.load(5),
            Err(SolverError::DimensionMismatch { expected: 5, found: 4 })
        ));
        assert!(CmsaStore::new(dir.path().join("none")).load(4).unwrap().is_none());
    }

    #[test]
    fn test_load_reports_short_row_width() {
        let dir = tempdir().unwrap();
        let store = CmsaStore::new(dir.path());
        fs::write(store.cmsa_path(), "0,1,2,1\n1,0,1,1\n2,1,0\n1,1,1,0\n").unwrap();
        assert!(matches!(
            store.load(4),
            Err(SolverError::DimensionMismatch { expected: 4, found: 3 })
        ));
    }
}
