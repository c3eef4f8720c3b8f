/// Data layer: cube types, the source collaborator, and synthetic cubes.
///
/// Architecture:
/// ```text
///  container (file, memory map, …)
///        │
///        ▼
///   ┌──────────┐
///   │  source   │  DataSource: named blocks + header cards
///   └──────────┘
///        │  load_cubes / load_compressed_covariance
///        ▼
///   ┌──────────────────────────────┐
///   │ IfuCubes, CompressedCovariance │  validated, immutable
///   └──────────────────────────────┘
///        │
///        ▼
///   covariance → binning → compare
/// ```

pub mod model;
pub mod source;
pub mod synthetic;
