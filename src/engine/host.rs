/*!
A CPU implementation of the device contract.

`HostDevice` executes the two reduction kernels on the host with the
exact semantics a GPU backend must provide: the same block geometry,
the same per-thread sequential folds, the same tree reduction with
tail masking, and the same one-byte-per-state ABI with `0xFF` as the
reject sentinel. It doubles as the engine's CPU fallback and as the
reference that keeps out-of-tree backends honest.

Scheduling follows the persistent-thread variant: a fixed pool of
worker threads claims block indices from a shared atomic counter until
none remain, instead of spawning one task per block.
*/

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use crate::engine::{
    device::{Arg, Device, DeviceError, KernelKind, Launch},
    BLOCK_SIZE, ITEMS_PER_BLOCK, ITEMS_PER_THREAD,
};

const REJECT: u8 = 0xFF;

/// A [`Device`] that runs the reduction kernels on the CPU.
#[derive(Clone, Debug)]
pub struct HostDevice {
    threads: usize,
}

impl HostDevice {
    /// Create a host device using all available parallelism.
    pub fn new() -> HostDevice {
        let threads = std::thread::available_parallelism()
            .map_or(1, |threads| threads.get());
        HostDevice { threads }
    }

    /// Create a host device with a fixed number of worker threads.
    pub fn with_threads(threads: usize) -> HostDevice {
        assert!(threads > 0, "a host device needs at least one thread");
        HostDevice { threads }
    }
}

impl Default for HostDevice {
    fn default() -> HostDevice {
        HostDevice::new()
    }
}

/// A "device" buffer that actually lives on the host heap.
///
/// The handle is cheaply clonable and releases its storage when the
/// last clone drops, which gives the idempotent-release behavior the
/// device contract requires.
#[derive(Clone, Debug)]
pub struct HostBuffer(Arc<Mutex<Vec<u8>>>);

impl HostBuffer {
    fn read(&self) -> Vec<u8> {
        self.0.lock().expect("host buffer lock poisoned").clone()
    }

    fn write(&self, data: &[u8]) {
        let mut guard = self.0.lock().expect("host buffer lock poisoned");
        guard[..data.len()].copy_from_slice(data);
    }
}

impl Device for HostDevice {
    type Buffer = HostBuffer;
    type Kernel = KernelKind;
    // Launches execute synchronously at enqueue time, so a completed
    // event carries no information.
    type Event = ();

    fn name(&self) -> &str {
        "host"
    }

    fn create_buffer(&self, len: usize) -> Result<HostBuffer, DeviceError> {
        Ok(HostBuffer(Arc::new(Mutex::new(vec![0; len]))))
    }

    fn create_buffer_with_data(
        &self,
        data: &[u8],
    ) -> Result<HostBuffer, DeviceError> {
        Ok(HostBuffer(Arc::new(Mutex::new(data.to_vec()))))
    }

    fn create_kernel(
        &self,
        kind: KernelKind,
    ) -> Result<KernelKind, DeviceError> {
        Ok(kind)
    }

    fn enqueue_kernel(
        &self,
        launch: Launch<'_, HostDevice>,
    ) -> Result<(), DeviceError> {
        assert!(
            launch.local == BLOCK_SIZE && launch.global % BLOCK_SIZE == 0,
            "kernels are compiled for a fixed block size of {}",
            BLOCK_SIZE,
        );
        match *launch.kernel {
            KernelKind::Initial => self.run_initial(&launch),
            KernelKind::Reduce => self.run_reduce(&launch),
        }
        Ok(())
    }

    fn read_buffer(
        &self,
        buffer: &HostBuffer,
        dst: &mut [u8],
        _wait: &[()],
    ) -> Result<(), DeviceError> {
        let data = buffer.read();
        dst.copy_from_slice(&data[..dst.len()]);
        Ok(())
    }
}

impl HostDevice {
    fn run_initial(&self, launch: &Launch<'_, HostDevice>) {
        // See `KernelKind::Initial` for the ABI decoded here. An
        // argument mismatch is a bug in the engine, not a runtime
        // condition.
        let (input, len, initial, merge, width, output) = match launch.args {
            [Arg::Buffer(input), Arg::U64(len), Arg::Buffer(initial), Arg::Buffer(merge), Arg::U32(width), Arg::Buffer(output)] => {
                (*input, *len as usize, *initial, *merge, *width as usize, *output)
            }
            args => panic!("initial kernel ABI violated: {:?}", args),
        };
        let input = input.read();
        let initial = initial.read();
        let merge = merge.read();
        assert_eq!(initial.len(), 256);
        assert!(len <= input.len());

        let blocks = launch.global / BLOCK_SIZE;
        let results = self.for_each_block(blocks, |block| {
            let base = block * ITEMS_PER_BLOCK;
            let valid = core::cmp::min(ITEMS_PER_BLOCK, len - base);
            // Phase one: each thread folds its slice of the block
            // sequentially, mapping bytes through the initial table.
            let mut exchange = [REJECT; BLOCK_SIZE];
            for thread in 0..BLOCK_SIZE {
                let offset = thread * ITEMS_PER_THREAD;
                if offset >= valid {
                    break;
                }
                let items =
                    core::cmp::min(ITEMS_PER_THREAD, valid - offset);
                let slice = &input[base + offset..base + offset + items];
                let mut acc = initial[usize::from(slice[0])];
                for &byte in &slice[1..] {
                    acc = merge_states(
                        &merge,
                        width,
                        acc,
                        initial[usize::from(byte)],
                    );
                }
                exchange[thread] = acc;
            }
            // Phase two: tree reduction over the live lanes. On a real
            // device a block barrier separates the strides.
            let lanes = div_ceil(valid, ITEMS_PER_THREAD);
            block_reduce(&merge, width, &mut exchange, lanes)
        });
        output.write(&results);
    }

    fn run_reduce(&self, launch: &Launch<'_, HostDevice>) {
        // See `KernelKind::Reduce` for the ABI decoded here.
        let (input, len, merge, width, output) = match launch.args {
            [Arg::Buffer(input), Arg::U64(len), Arg::Buffer(merge), Arg::U32(width), Arg::Buffer(output)] => {
                (*input, *len as usize, *merge, *width as usize, *output)
            }
            args => panic!("reduce kernel ABI violated: {:?}", args),
        };
        let input = input.read();
        let merge = merge.read();
        assert!(len <= input.len());

        let blocks = launch.global / BLOCK_SIZE;
        let results = self.for_each_block(blocks, |block| {
            let base = block * ITEMS_PER_BLOCK;
            let valid = core::cmp::min(ITEMS_PER_BLOCK, len - base);
            let mut exchange = [REJECT; BLOCK_SIZE];
            for thread in 0..BLOCK_SIZE {
                let offset = thread * ITEMS_PER_THREAD;
                if offset >= valid {
                    break;
                }
                let items =
                    core::cmp::min(ITEMS_PER_THREAD, valid - offset);
                let slice = &input[base + offset..base + offset + items];
                let mut acc = slice[0];
                for &state in &slice[1..] {
                    acc = merge_states(&merge, width, acc, state);
                }
                exchange[thread] = acc;
            }
            let lanes = div_ceil(valid, ITEMS_PER_THREAD);
            block_reduce(&merge, width, &mut exchange, lanes)
        });
        output.write(&results);
    }

    /// Run `body` once per block index and collect one output byte per
    /// block, in block order.
    ///
    /// This is the persistent-thread scheme: `self.threads` workers
    /// each claim the next unprocessed block from a shared counter and
    /// keep going until the counter runs out. The claim uses
    /// acquire-release ordering; the only cross-thread data are the
    /// read-only tables and the per-block result cells, which are
    /// disjoint per claim.
    fn for_each_block<F>(&self, blocks: usize, body: F) -> Vec<u8>
    where
        F: Fn(usize) -> u8 + Sync,
    {
        let counter = AtomicUsize::new(0);
        let results = Mutex::new(vec![REJECT; blocks]);
        let workers = core::cmp::min(self.threads, blocks);
        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let block = counter.fetch_add(1, Ordering::AcqRel);
                    if block >= blocks {
                        break;
                    }
                    let state = body(block);
                    results.lock().expect("result lock poisoned")[block] =
                        state;
                });
            }
        });
        results.into_inner().expect("result lock poisoned")
    }
}

/// Compose two state bytes through the merge table. The sentinel
/// absorbs without a lookup, exactly as device code does it.
#[inline]
fn merge_states(merge: &[u8], width: usize, a: u8, b: u8) -> u8 {
    if a == REJECT || b == REJECT {
        return REJECT;
    }
    merge[usize::from(a) * width + usize::from(b)]
}

/// The block-level tree reduction over the first `lanes` entries of
/// the exchange array. Lanes at or beyond `lanes` hold no value and
/// must not contribute; because live lanes are a prefix, the
/// bounds check on the right-hand lane is the only masking needed.
fn block_reduce(
    merge: &[u8],
    width: usize,
    exchange: &mut [u8; BLOCK_SIZE],
    lanes: usize,
) -> u8 {
    debug_assert!(lanes > 0);
    let mut stride = 1;
    while stride < BLOCK_SIZE {
        let mut lane = 0;
        while lane + stride < lanes {
            exchange[lane] = merge_states(
                merge,
                width,
                exchange[lane],
                exchange[lane + stride],
            );
            lane += 2 * stride;
        }
        stride *= 2;
    }
    exchange[0]
}

fn div_ceil(value: usize, divisor: usize) -> usize {
    (value + divisor - 1) / divisor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;

    fn engine(threads: usize) -> Engine<HostDevice> {
        Engine::new(HostDevice::with_threads(threads)).unwrap()
    }

    #[test]
    fn matches_at_block_boundaries() {
        let engine = engine(4);
        let pattern = engine.compile("a*").unwrap();
        for len in [
            0,
            1,
            ITEMS_PER_THREAD,
            ITEMS_PER_THREAD + 1,
            ITEMS_PER_BLOCK - 1,
            ITEMS_PER_BLOCK,
            ITEMS_PER_BLOCK + 1,
            3 * ITEMS_PER_BLOCK + 17,
        ] {
            let input = vec![b'a'; len];
            assert_eq!(
                engine.matches(&pattern, &input).unwrap(),
                true,
                "length {}",
                len,
            );
            if len > 0 {
                let mut bad = input.clone();
                bad[len - 1] = b'b';
                assert_eq!(
                    engine.matches(&pattern, &bad).unwrap(),
                    false,
                    "length {}",
                    len,
                );
            }
        }
    }

    #[test]
    fn single_thread_and_many_threads_agree() {
        let one = engine(1);
        let many = engine(8);
        let p1 = one.compile("(ab)*").unwrap();
        let p2 = many.compile("(ab)*").unwrap();
        let input: Vec<u8> =
            std::iter::repeat([b'a', b'b']).take(9000).flatten().collect();
        assert_eq!(
            one.matches(&p1, &input).unwrap(),
            many.matches(&p2, &input).unwrap(),
        );
    }

    #[test]
    fn multi_pass_reduction() {
        // More than ITEMS_PER_BLOCK blocks forces a second reduce
        // pass: 4097 blocks of 4096 bytes.
        let engine = engine(8);
        let pattern = engine.compile("a*").unwrap();
        let len = (ITEMS_PER_BLOCK + 1) * ITEMS_PER_BLOCK;
        let mut input = vec![b'a'; len];
        assert!(engine.matches(&pattern, &input).unwrap());
        input[len / 2] = b'x';
        assert!(!engine.matches(&pattern, &input).unwrap());
    }

    #[test]
    fn rejecting_everything_pattern() {
        let engine = engine(2);
        let pattern = engine.compile("[]").unwrap();
        assert!(!engine.matches(&pattern, b"").unwrap());
        assert!(!engine.matches(&pattern, b"anything").unwrap());
    }

    #[test]
    fn empty_input_never_touches_kernels() {
        let engine = engine(1);
        let pattern = engine.compile("a|").unwrap();
        assert!(engine.matches(&pattern, b"").unwrap());
        let pattern = engine.compile("a").unwrap();
        assert!(!engine.matches(&pattern, b"").unwrap());
    }
}
