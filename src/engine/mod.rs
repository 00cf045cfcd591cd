/*!
The reduction engine and the device contract it drives.

[`Engine`] owns a [`Device`] and decides acceptance by the two-kernel
scheme: an *initial* kernel maps input bytes to parallel states and
reduces each block of [`ITEMS_PER_BLOCK`] bytes to one state, and a
*reduce* kernel repeatedly folds blocks of intermediate states until a
single state remains, which the host reads back and interprets.

The [`Device`] trait is the boundary to the outside world: a real GPU
backend (OpenCL, Vulkan, ...) implements it out of tree. This crate
ships [`HostDevice`], which executes both kernels on the CPU with the
same block semantics and serves as the reference backend and test
double.
*/

pub use self::{
    device::{Arg, Device, DeviceError, KernelKind, Launch},
    host::HostDevice,
    reduction::{CompiledPattern, Engine, Error},
};

mod device;
mod host;
mod reduction;

/// The number of threads in one device block.
///
/// This value is baked into the kernels; the host uses it for launch
/// geometry and size arithmetic, so host and device must agree on it.
pub const BLOCK_SIZE: usize = 256;

/// The number of input items each thread reduces sequentially before
/// the block-level tree reduction starts.
pub const ITEMS_PER_THREAD: usize = 16;

/// The number of input items consumed by one block, and therefore the
/// reduction factor of each kernel pass.
pub const ITEMS_PER_BLOCK: usize = BLOCK_SIZE * ITEMS_PER_THREAD;
