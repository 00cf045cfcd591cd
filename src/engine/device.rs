/*!
The contract between the reduction engine and a compute device.

This crate does not talk to any GPU API directly. Instead, the engine
drives an implementation of the [`Device`] trait: buffers hold bytes,
kernels are identified by [`KernelKind`], launches are asynchronous and
ordered by completion events, and the only blocking operation is the
final readback. [`HostDevice`](crate::engine::HostDevice) is the
in-crate implementation; real GPU backends live out of tree.
*/

use std::fmt;

/// A compute device capable of running the two reduction kernels.
///
/// # Resource discipline
///
/// All three handle types follow scoped acquisition: dropping a handle
/// releases the underlying device resource, and releasing twice (e.g.
/// a buffer outliving its device) must be a no-op. The engine relies
/// on this for cleanup on every exit path, including errors.
///
/// # Ordering
///
/// `enqueue_kernel` must not block. A launch observes the writes of
/// the launches listed in its `wait` events; without a dependency, no
/// cross-launch ordering is guaranteed. `read_buffer` blocks until its
/// `wait` events have completed and the data is on the host. A failure
/// that occurs asynchronously inside a launch surfaces at the next
/// dependent `enqueue_kernel` or at `read_buffer`.
pub trait Device {
    /// A device-resident byte buffer.
    type Buffer;
    /// A loaded kernel.
    type Kernel;
    /// A completion token for an enqueued kernel, usable as a launch
    /// dependency.
    type Event: Clone;

    /// A human readable name for diagnostics.
    fn name(&self) -> &str;

    /// Create an uninitialized buffer of `len` bytes.
    fn create_buffer(&self, len: usize) -> Result<Self::Buffer, DeviceError>;

    /// Create a buffer of `data.len()` bytes initialized with `data`.
    fn create_buffer_with_data(
        &self,
        data: &[u8],
    ) -> Result<Self::Buffer, DeviceError>;

    /// Look up one of the two reduction kernels.
    fn create_kernel(
        &self,
        kind: KernelKind,
    ) -> Result<Self::Kernel, DeviceError>;

    /// Append a kernel launch to the device queue and return its
    /// completion event.
    fn enqueue_kernel(
        &self,
        launch: Launch<'_, Self>,
    ) -> Result<Self::Event, DeviceError>;

    /// Copy `dst.len()` bytes from the start of `buffer` to the host,
    /// after all `wait` events have completed. This is the engine's
    /// only blocking call.
    fn read_buffer(
        &self,
        buffer: &Self::Buffer,
        dst: &mut [u8],
        wait: &[Self::Event],
    ) -> Result<(), DeviceError>;
}

/// Identifies one of the two kernels of the reduction scheme, and
/// documents the ABI the engine assumes for it.
///
/// Both kernels run with a block size of
/// [`BLOCK_SIZE`](crate::engine::BLOCK_SIZE) threads, each thread
/// reducing [`ITEMS_PER_THREAD`](crate::engine::ITEMS_PER_THREAD)
/// items sequentially before a barrier-synchronized tree reduction in
/// block-local memory combines the per-thread results. Device code
/// must be built with the same two constants as the host.
///
/// Parallel states are single bytes; the value `0xFF` is the reject
/// sentinel on both sides of the ABI, and it absorbs merging without a
/// table lookup. Items at indices at or beyond the item count do not
/// contribute to their block's result (the last block masks its tail).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KernelKind {
    /// Maps each input byte to its per-byte parallel state and reduces
    /// every [`ITEMS_PER_BLOCK`](crate::engine::ITEMS_PER_BLOCK)-byte
    /// block to one state.
    ///
    /// Arguments, in order:
    ///
    /// 0. input bytes (buffer)
    /// 1. input length in bytes (u64)
    /// 2. initial state table, 256 bytes (buffer)
    /// 3. merge table, `width * width` bytes row-major (buffer)
    /// 4. width: the number of parallel states (u32)
    /// 5. output, one state byte per block (buffer)
    Initial,
    /// Reduces every block of
    /// [`ITEMS_PER_BLOCK`](crate::engine::ITEMS_PER_BLOCK) parallel
    /// states from the previous pass to one state.
    ///
    /// Arguments, in order:
    ///
    /// 0. input states (buffer)
    /// 1. input length in states (u64)
    /// 2. merge table, `width * width` bytes row-major (buffer)
    /// 3. width: the number of parallel states (u32)
    /// 4. output, one state byte per block (buffer)
    Reduce,
}

/// One argument of a kernel launch.
#[derive(Debug)]
pub enum Arg<'a, B> {
    /// A device buffer.
    Buffer(&'a B),
    /// A 32-bit scalar.
    U32(u32),
    /// A 64-bit scalar.
    U64(u64),
}

/// A kernel launch: the kernel, its geometry, its arguments and the
/// events it must wait for.
pub struct Launch<'a, D: Device + ?Sized> {
    /// The kernel to run.
    pub kernel: &'a D::Kernel,
    /// The total number of threads; a multiple of `local`.
    pub global: usize,
    /// The number of threads per block.
    pub local: usize,
    /// The kernel arguments, in ABI order (see [`KernelKind`]).
    pub args: &'a [Arg<'a, D::Buffer>],
    /// Events that must complete before this launch runs.
    pub wait: &'a [D::Event],
}

/// An error reported by a device.
///
/// The discriminants mirror what GPU runtimes actually report:
/// missing platforms or devices, kernel build problems, the three
/// flavors of memory exhaustion, and asynchronous queue failures.
/// Resource errors are potentially retryable (with a smaller input or
/// after releasing patterns); the others are not.
#[derive(Clone, Debug)]
pub struct DeviceError {
    kind: ErrorKind,
}

#[derive(Clone, Debug)]
enum ErrorKind {
    NoPlatform,
    NoDevice,
    CompilerNotAvailable,
    KernelBuildFailure { message: String },
    OutOfHostMemory,
    OutOfDeviceMemory,
    OutOfDeviceResources,
    QueueFailure { message: String },
}

impl DeviceError {
    fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// No compute platform is available on this machine.
    pub fn no_platform() -> DeviceError {
        DeviceError { kind: ErrorKind::NoPlatform }
    }

    /// No device matched the selection criteria.
    pub fn no_device() -> DeviceError {
        DeviceError { kind: ErrorKind::NoDevice }
    }

    /// The platform cannot compile kernels (e.g. a runtime without a
    /// compiler).
    pub fn compiler_not_available() -> DeviceError {
        DeviceError { kind: ErrorKind::CompilerNotAvailable }
    }

    /// Building a kernel failed; `message` carries the build log.
    pub fn kernel_build_failure(message: String) -> DeviceError {
        DeviceError { kind: ErrorKind::KernelBuildFailure { message } }
    }

    /// Host memory was exhausted while servicing a device call.
    pub fn out_of_host_memory() -> DeviceError {
        DeviceError { kind: ErrorKind::OutOfHostMemory }
    }

    /// Device memory was exhausted.
    pub fn out_of_device_memory() -> DeviceError {
        DeviceError { kind: ErrorKind::OutOfDeviceMemory }
    }

    /// A non-memory device resource (queues, registers, block memory)
    /// was exhausted.
    pub fn out_of_device_resources() -> DeviceError {
        DeviceError { kind: ErrorKind::OutOfDeviceResources }
    }

    /// The device queue failed, typically reporting an earlier
    /// asynchronous launch error.
    pub fn queue_failure(message: String) -> DeviceError {
        DeviceError { kind: ErrorKind::QueueFailure { message } }
    }

    /// Returns true when retrying with a smaller input or after
    /// releasing resources could succeed.
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::OutOfHostMemory
                | ErrorKind::OutOfDeviceMemory
                | ErrorKind::OutOfDeviceResources
        )
    }
}

impl std::error::Error for DeviceError {}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind() {
            ErrorKind::NoPlatform => {
                write!(f, "no compute platform available")
            }
            ErrorKind::NoDevice => {
                write!(f, "no matching compute device found")
            }
            ErrorKind::CompilerNotAvailable => {
                write!(f, "device platform has no kernel compiler")
            }
            ErrorKind::KernelBuildFailure { message } => {
                write!(f, "kernel build failed: {}", message)
            }
            ErrorKind::OutOfHostMemory => write!(f, "out of host memory"),
            ErrorKind::OutOfDeviceMemory => {
                write!(f, "out of device memory")
            }
            ErrorKind::OutOfDeviceResources => {
                write!(f, "out of device resources")
            }
            ErrorKind::QueueFailure { message } => {
                write!(f, "device queue failure: {}", message)
            }
        }
    }
}
