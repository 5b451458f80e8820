use std::fmt;

use gsg_tensor::{AcceleratorGeneration, DType, MatrixLayout};

use crate::padder::{MatrixPadder, TileSizes};

/// Which of the four problem extents are padded up to tile multiples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GemmSpecialization {
    Default,
    MPadding,
    NPadding,
    KPadding,
    OPadding,
    MNPadding,
    MKPadding,
    NKPadding,
    MOPadding,
    NOPadding,
    KOPadding,
    MNKPadding,
    MNOPadding,
    MKOPadding,
    NKOPadding,
    MNKOPadding,
}

impl GemmSpecialization {
    pub const ALL: [GemmSpecialization; 16] = [
        GemmSpecialization::Default,
        GemmSpecialization::MPadding,
        GemmSpecialization::NPadding,
        GemmSpecialization::KPadding,
        GemmSpecialization::OPadding,
        GemmSpecialization::MNPadding,
        GemmSpecialization::MKPadding,
        GemmSpecialization::NKPadding,
        GemmSpecialization::MOPadding,
        GemmSpecialization::NOPadding,
        GemmSpecialization::KOPadding,
        GemmSpecialization::MNKPadding,
        GemmSpecialization::MNOPadding,
        GemmSpecialization::MKOPadding,
        GemmSpecialization::NKOPadding,
        GemmSpecialization::MNKOPadding,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            GemmSpecialization::Default => "Default",
            GemmSpecialization::MPadding => "MPadding",
            GemmSpecialization::NPadding => "NPadding",
            GemmSpecialization::KPadding => "KPadding",
            GemmSpecialization::OPadding => "OPadding",
            GemmSpecialization::MNPadding => "MNPadding",
            GemmSpecialization::MKPadding => "MKPadding",
            GemmSpecialization::NKPadding => "NKPadding",
            GemmSpecialization::MOPadding => "MOPadding",
            GemmSpecialization::NOPadding => "NOPadding",
            GemmSpecialization::KOPadding => "KOPadding",
            GemmSpecialization::MNKPadding => "MNKPadding",
            GemmSpecialization::MNOPadding => "MNOPadding",
            GemmSpecialization::MKOPadding => "MKOPadding",
            GemmSpecialization::NKOPadding => "NKOPadding",
            GemmSpecialization::MNKOPadding => "MNKOPadding",
        }
    }

    /// Which of `(M, N, K, O)` this specialization pads.
    pub fn padded(&self) -> (bool, bool, bool, bool) {
        match self {
            GemmSpecialization::Default => (false, false, false, false),
            GemmSpecialization::MPadding => (true, false, false, false),
            GemmSpecialization::NPadding => (false, true, false, false),
            GemmSpecialization::KPadding => (false, false, true, false),
            GemmSpecialization::OPadding => (false, false, false, true),
            GemmSpecialization::MNPadding => (true, true, false, false),
            GemmSpecialization::MKPadding => (true, false, true, false),
            GemmSpecialization::NKPadding => (false, true, true, false),
            GemmSpecialization::MOPadding => (true, false, false, true),
            GemmSpecialization::NOPadding => (false, true, false, true),
            GemmSpecialization::KOPadding => (false, false, true, true),
            GemmSpecialization::MNKPadding => (true, true, true, false),
            GemmSpecialization::MNOPadding => (true, true, false, true),
            GemmSpecialization::MKOPadding => (true, false, true, true),
            GemmSpecialization::NKOPadding => (false, true, true, true),
            GemmSpecialization::MNKOPadding => (true, true, true, true),
        }
    }

    pub fn pads_m(&self) -> bool {
        self.padded().0
    }

    pub fn pads_n(&self) -> bool {
        self.padded().1
    }

    pub fn pads_k(&self) -> bool {
        self.padded().2
    }

    pub fn pads_o(&self) -> bool {
        self.padded().3
    }
}

impl fmt::Display for GemmSpecialization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Compile-time description of one tile kernel instance.
///
/// Every launch path is generic over a `TileConfig`, so the constants below
/// are fixed per monomorphised instance.
pub trait TileConfig: Send + Sync + 'static {
    /// Work-items per block. Only reported, the emulated launch ignores it.
    const BLOCK_SIZE: usize;
    /// Output rows per tile.
    const M_PER_BLOCK: usize;
    /// Columns of the first product (and reduction depth of the second) per step.
    const N_PER_BLOCK: usize;
    /// Reduction depth of the first product per main-loop iteration.
    const K_PER_BLOCK: usize;
    /// Output columns per tile.
    const GEMM1_N_PER_BLOCK: usize;
    /// Reduction depth of the second product per step.
    const GEMM1_K_PER_BLOCK: usize;
    const AK1: usize;
    const BK1: usize;
    const B1K1: usize;
    const A_SCALAR_PER_VECTOR: usize;
    const B_SCALAR_PER_VECTOR: usize;
    const B1_SCALAR_PER_VECTOR: usize;
    const C_SCALAR_PER_VECTOR: usize;
    const A_LAYOUT: MatrixLayout;
    const B_LAYOUT: MatrixLayout;
    const B1_LAYOUT: MatrixLayout;
    const SPECIALIZATION: GemmSpecialization;
    /// Exclude `col > row` from the softmax (causal attention).
    const MASK_OUT_UPPER_TRIANGLE: bool;
    const DATA_TYPE: DType;
    const SUPPORTED_GENERATIONS: &'static [AcceleratorGeneration] =
        &[AcceleratorGeneration::Gfx908, AcceleratorGeneration::Gfx90a];

    fn padder() -> MatrixPadder {
        MatrixPadder::new(
            Self::SPECIALIZATION,
            TileSizes {
                m: Self::M_PER_BLOCK,
                n: Self::N_PER_BLOCK,
                k: Self::K_PER_BLOCK,
                o: Self::GEMM1_N_PER_BLOCK,
            },
        )
    }
}

/// fp16 attention tile: 128x128 first product, 64-wide output, causal mask.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fp16Tile128x128x32Masked;

impl TileConfig for Fp16Tile128x128x32Masked {
    const BLOCK_SIZE: usize = 256;
    const M_PER_BLOCK: usize = 128;
    const N_PER_BLOCK: usize = 128;
    const K_PER_BLOCK: usize = 32;
    const GEMM1_N_PER_BLOCK: usize = 64;
    const GEMM1_K_PER_BLOCK: usize = 32;
    const AK1: usize = 8;
    const BK1: usize = 8;
    const B1K1: usize = 2;
    const A_SCALAR_PER_VECTOR: usize = 8;
    const B_SCALAR_PER_VECTOR: usize = 8;
    const B1_SCALAR_PER_VECTOR: usize = 4;
    const C_SCALAR_PER_VECTOR: usize = 8;
    const A_LAYOUT: MatrixLayout = MatrixLayout::RowMajor;
    const B_LAYOUT: MatrixLayout = MatrixLayout::ColumnMajor;
    const B1_LAYOUT: MatrixLayout = MatrixLayout::RowMajor;
    const SPECIALIZATION: GemmSpecialization = GemmSpecialization::MNKOPadding;
    const MASK_OUT_UPPER_TRIANGLE: bool = true;
    const DATA_TYPE: DType = DType::F16;
}

/// fp32 tile: 64x64 first product, 64-wide output, no causal mask.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fp32Tile64x64x32;

impl TileConfig for Fp32Tile64x64x32 {
    const BLOCK_SIZE: usize = 256;
    const M_PER_BLOCK: usize = 64;
    const N_PER_BLOCK: usize = 64;
    const K_PER_BLOCK: usize = 32;
    const GEMM1_N_PER_BLOCK: usize = 64;
    const GEMM1_K_PER_BLOCK: usize = 32;
    const AK1: usize = 4;
    const BK1: usize = 4;
    const B1K1: usize = 2;
    const A_SCALAR_PER_VECTOR: usize = 4;
    const B_SCALAR_PER_VECTOR: usize = 4;
    const B1_SCALAR_PER_VECTOR: usize = 4;
    const C_SCALAR_PER_VECTOR: usize = 4;
    const A_LAYOUT: MatrixLayout = MatrixLayout::RowMajor;
    const B_LAYOUT: MatrixLayout = MatrixLayout::ColumnMajor;
    const B1_LAYOUT: MatrixLayout = MatrixLayout::RowMajor;
    const SPECIALIZATION: GemmSpecialization = GemmSpecialization::MNKOPadding;
    const MASK_OUT_UPPER_TRIANGLE: bool = false;
    const DATA_TYPE: DType = DType::F32;
}

/// Order in which the emulated launch walks the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockOrder {
    #[default]
    Ascending,
    Descending,
}

impl BlockOrder {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "ascending" | "asc" => Some(BlockOrder::Ascending),
            "descending" | "desc" => Some(BlockOrder::Descending),
            _ => None,
        }
    }
}

/// Runtime launch options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Measure the launch and report the average elapsed time.
    pub time_kernel: bool,
    /// Untimed warm-up launches before measuring.
    pub cold_iterations: usize,
    /// Launches averaged into the reported time.
    pub timed_iterations: usize,
    pub block_order: BlockOrder,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            time_kernel: false,
            cold_iterations: 1,
            timed_iterations: 10,
            block_order: BlockOrder::Ascending,
        }
    }
}

impl StreamConfig {
    /// Default options with timing switched on.
    pub fn timed() -> Self {
        StreamConfig {
            time_kernel: true,
            ..Self::default()
        }
    }

    pub fn with_block_order(mut self, block_order: BlockOrder) -> Self {
        self.block_order = block_order;
        self
    }

    /// Defaults overridden by `GSG_TIME_KERNEL`, `GSG_TIMED_ITERATIONS` and
    /// `GSG_BLOCK_ORDER`.
    pub fn from_env() -> Self {
        Self::default().override_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`. Unparsable values are logged and ignored.
    pub fn override_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(value) = lookup("GSG_TIME_KERNEL") {
            match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => self.time_kernel = true,
                "0" | "false" | "off" | "no" => self.time_kernel = false,
                other => log::warn!("ignoring GSG_TIME_KERNEL={:?}", other),
            }
        }
        if let Some(value) = lookup("GSG_TIMED_ITERATIONS") {
            match value.trim().parse::<usize>() {
                Ok(n) if n > 0 => self.timed_iterations = n,
                _ => log::warn!("ignoring GSG_TIMED_ITERATIONS={:?}", value),
            }
        }
        if let Some(value) = lookup("GSG_BLOCK_ORDER") {
            match BlockOrder::from_name(&value) {
                Some(order) => self.block_order = order,
                None => log::warn!("ignoring GSG_BLOCK_ORDER={:?}", value),
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specialization_flags() {
        let spec = GemmSpecialization::MKOPadding;
        assert!(spec.pads_m());
        assert!(!spec.pads_n());
        assert!(spec.pads_k());
        assert!(spec.pads_o());

        let none = GemmSpecialization::Default;
        assert!(!none.pads_m() && !none.pads_n() && !none.pads_k() && !none.pads_o());

        let all = GemmSpecialization::MNKOPadding;
        assert!(all.pads_m() && all.pads_n() && all.pads_k() && all.pads_o());
    }

    #[test]
    fn test_specializations_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for spec in GemmSpecialization::ALL {
            let key = (spec.pads_m(), spec.pads_n(), spec.pads_k(), spec.pads_o());
            assert!(seen.insert(key), "{} repeats a padding set", spec);
        }
        assert_eq!(seen.len(), 16);
    }

    #[test]
    fn test_padding_flags_agree_with_names() {
        for spec in GemmSpecialization::ALL {
            let name = spec.name();
            let dims = if spec == GemmSpecialization::Default {
                ""
            } else {
                name.strip_suffix("Padding").unwrap()
            };
            let (m, n, k, o) = spec.padded();
            assert_eq!(
                (m, n, k, o),
                (dims.contains('M'), dims.contains('N'), dims.contains('K'), dims.contains('O')),
                "{}",
                name
            );
        }
    }

    #[test]
    fn test_stream_config_defaults() {
        let config = StreamConfig::default();
        assert!(!config.time_kernel);
        assert_eq!(config.cold_iterations, 1);
        assert_eq!(config.timed_iterations, 10);
        assert_eq!(config.block_order, BlockOrder::Ascending);
    }

    #[test]
    fn test_stream_config_overrides() {
        let config = StreamConfig::default().override_from(|key| match key {
            "GSG_TIME_KERNEL" => Some("true".to_string()),
            "GSG_TIMED_ITERATIONS" => Some("3".to_string()),
            "GSG_BLOCK_ORDER" => Some("desc".to_string()),
            _ => None,
        });
        assert!(config.time_kernel);
        assert_eq!(config.timed_iterations, 3);
        assert_eq!(config.block_order, BlockOrder::Descending);
    }

    #[test]
    fn test_stream_config_ignores_garbage() {
        let config = StreamConfig::default().override_from(|key| match key {
            "GSG_TIMED_ITERATIONS" => Some("zero".to_string()),
            "GSG_BLOCK_ORDER" => Some("sideways".to_string()),
            _ => None,
        });
        assert_eq!(config, StreamConfig::default());
    }
}
