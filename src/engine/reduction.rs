use log::{debug, trace};

use crate::{
    engine::{
        device::{Arg, Device, DeviceError, KernelKind, Launch},
        BLOCK_SIZE, ITEMS_PER_BLOCK,
    },
    error::CompileError,
    pdfa::{ParaStateID, ParallelDfa},
};

/// The reduction engine: compiles patterns onto a device and decides
/// acceptance with the two-kernel scan/reduce scheme.
///
/// Distinct engines are independent; a single engine must not be used
/// from multiple threads at once.
pub struct Engine<D: Device> {
    device: D,
    initial_kernel: D::Kernel,
    reduce_kernel: D::Kernel,
}

/// A pattern compiled for a particular engine: the parallel DFA plus
/// device-resident copies of its tables.
///
/// Dropping a compiled pattern releases its device buffers.
pub struct CompiledPattern<D: Device> {
    pdfa: ParallelDfa,
    initial: D::Buffer,
    merge: D::Buffer,
}

impl<D: Device> CompiledPattern<D> {
    /// Returns the parallel DFA this pattern was compiled from.
    pub fn pdfa(&self) -> &ParallelDfa {
        &self.pdfa
    }
}

impl<D: Device> Engine<D> {
    /// Create an engine on the given device. This loads both kernels
    /// up front, so kernel availability problems surface here rather
    /// than at the first match.
    pub fn new(device: D) -> Result<Engine<D>, Error> {
        let initial_kernel =
            device.create_kernel(KernelKind::Initial).map_err(Error::device)?;
        let reduce_kernel =
            device.create_kernel(KernelKind::Reduce).map_err(Error::device)?;
        debug!("reduction engine ready on device {:?}", device.name());
        Ok(Engine { device, initial_kernel, reduce_kernel })
    }

    /// Returns the device this engine drives.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Compile the given pattern text and upload its tables.
    pub fn compile(
        &self,
        pattern: &str,
    ) -> Result<CompiledPattern<D>, Error> {
        let pdfa = ParallelDfa::new(pattern).map_err(Error::compile)?;
        self.compile_pdfa(pdfa)
    }

    /// Upload an already-built parallel DFA.
    pub fn compile_pdfa(
        &self,
        pdfa: ParallelDfa,
    ) -> Result<CompiledPattern<D>, Error> {
        let initial = self
            .device
            .create_buffer_with_data(&pdfa.initial_bytes())
            .map_err(Error::device)?;
        // A pattern that rejects every non-empty input has an empty
        // merge table; upload a single sentinel byte so that the
        // buffer exists. The kernels never index an empty table, since
        // every initial state is already the sentinel.
        let merge_bytes = pdfa.merge_bytes();
        let merge_bytes: &[u8] =
            if merge_bytes.is_empty() { &[0xFF] } else { &merge_bytes };
        let merge = self
            .device
            .create_buffer_with_data(merge_bytes)
            .map_err(Error::device)?;
        Ok(CompiledPattern { pdfa, initial, merge })
    }

    /// Decide whether the entire input matches the compiled pattern.
    ///
    /// The empty input is answered on the host without touching the
    /// device. Everything else runs the initial kernel once and the
    /// reduce kernel until one state byte remains, with each pass
    /// gated on the previous pass's completion event; the host blocks
    /// only at the final readback.
    pub fn matches(
        &self,
        pattern: &CompiledPattern<D>,
        haystack: &[u8],
    ) -> Result<bool, Error> {
        if haystack.is_empty() {
            return Ok(pattern.pdfa.empty_is_accepting());
        }
        let blocks = div_ceil(haystack.len(), ITEMS_PER_BLOCK);
        let width = pattern.pdfa.len() as u32;

        let input = self
            .device
            .create_buffer_with_data(haystack)
            .map_err(Error::device)?;
        let mut ping =
            self.device.create_buffer(blocks).map_err(Error::device)?;
        let mut pong = self
            .device
            .create_buffer(core::cmp::max(1, div_ceil(blocks, ITEMS_PER_BLOCK)))
            .map_err(Error::device)?;

        let mut wait = [self
            .device
            .enqueue_kernel(Launch {
                kernel: &self.initial_kernel,
                global: blocks * BLOCK_SIZE,
                local: BLOCK_SIZE,
                args: &[
                    Arg::Buffer(&input),
                    Arg::U64(haystack.len() as u64),
                    Arg::Buffer(&pattern.initial),
                    Arg::Buffer(&pattern.merge),
                    Arg::U32(width),
                    Arg::Buffer(&ping),
                ],
                wait: &[],
            })
            .map_err(Error::device)?];

        let mut size = blocks;
        while size > 1 {
            let out_size = div_ceil(size, ITEMS_PER_BLOCK);
            trace!("reduce pass: {} states -> {}", size, out_size);
            wait = [self
                .device
                .enqueue_kernel(Launch {
                    kernel: &self.reduce_kernel,
                    global: out_size * BLOCK_SIZE,
                    local: BLOCK_SIZE,
                    args: &[
                        Arg::Buffer(&ping),
                        Arg::U64(size as u64),
                        Arg::Buffer(&pattern.merge),
                        Arg::U32(width),
                        Arg::Buffer(&pong),
                    ],
                    wait: &wait,
                })
                .map_err(Error::device)?];
            core::mem::swap(&mut ping, &mut pong);
            size = out_size;
        }

        let mut result = [0u8; 1];
        self.device
            .read_buffer(&ping, &mut result, &wait)
            .map_err(Error::device)?;
        let id = ParaStateID::from_u8(result[0]);
        if !id.is_reject() && id.as_usize() >= pattern.pdfa.len() {
            return Err(Error::device(DeviceError::queue_failure(format!(
                "device returned out-of-range state {}",
                result[0],
            ))));
        }
        Ok(pattern.pdfa.is_accepting(id))
    }
}

fn div_ceil(value: usize, divisor: usize) -> usize {
    (value + divisor - 1) / divisor
}

/// An error returned by an [`Engine`].
///
/// Either the pattern failed to compile, or the device failed; the
/// original cause is preserved and reachable via `source`.
#[derive(Clone, Debug)]
pub struct Error {
    kind: ErrorKind,
}

#[derive(Clone, Debug)]
enum ErrorKind {
    Compile(CompileError),
    Device(DeviceError),
}

impl Error {
    fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub(crate) fn compile(err: CompileError) -> Error {
        Error { kind: ErrorKind::Compile(err) }
    }

    pub(crate) fn device(err: DeviceError) -> Error {
        Error { kind: ErrorKind::Device(err) }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self.kind() {
            ErrorKind::Compile(ref err) => Some(err),
            ErrorKind::Device(ref err) => Some(err),
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self.kind() {
            ErrorKind::Compile(_) => write!(f, "pattern compilation failed"),
            ErrorKind::Device(_) => write!(f, "device operation failed"),
        }
    }
}
