// Emulated accelerator.
//
// Kernels written against this module see the same things they would on real
// hardware: typed global memory addressed through device pointers, a
// read-only workspace filled by the host before launch, and a generation tag
// describing the instruction set the kernel was built for.
mod memory;
mod workspace;

pub use memory::{DeviceMemory, DevicePtr};
pub use workspace::DeviceWorkspace;

use std::fmt;

/// Hardware capability set a compute engine can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcceleratorGeneration {
    Gfx908,
    Gfx90a,
    Gfx940,
    Gfx1030,
    Gfx1100,
}

impl AcceleratorGeneration {
    pub const ALL: [AcceleratorGeneration; 5] = [
        AcceleratorGeneration::Gfx908,
        AcceleratorGeneration::Gfx90a,
        AcceleratorGeneration::Gfx940,
        AcceleratorGeneration::Gfx1030,
        AcceleratorGeneration::Gfx1100,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AcceleratorGeneration::Gfx908 => "gfx908",
            AcceleratorGeneration::Gfx90a => "gfx90a",
            AcceleratorGeneration::Gfx940 => "gfx940",
            AcceleratorGeneration::Gfx1030 => "gfx1030",
            AcceleratorGeneration::Gfx1100 => "gfx1100",
        }
    }

    /// Parses a device name. Feature suffixes such as `gfx90a:sramecc+:xnack-`
    /// are ignored.
    pub fn from_name(name: &str) -> Option<Self> {
        let base = name.split(':').next().unwrap_or(name).trim();
        Self::ALL.iter().copied().find(|g| g.name() == base)
    }
}

impl fmt::Display for AcceleratorGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// An emulated accelerator: identity plus global memory.
#[derive(Debug, Clone)]
pub struct Device {
    generation: AcceleratorGeneration,
    memory: DeviceMemory,
}

impl Device {
    pub fn new(generation: AcceleratorGeneration) -> Self {
        Device {
            generation,
            memory: DeviceMemory::new(),
        }
    }

    pub fn generation(&self) -> AcceleratorGeneration {
        self.generation
    }

    pub fn name(&self) -> &'static str {
        self.generation.name()
    }

    pub fn memory(&self) -> &DeviceMemory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut DeviceMemory {
        &mut self.memory
    }
}
