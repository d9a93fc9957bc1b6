//! Device worker: the per-GPU loop. Allocates buffers once, dispatches
//! the kernel with a fresh random base-salt each batch, drains result slots,
//! hands hits to the validator, and updates the shared status snapshot.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use ocl::{Buffer, Context, Device, Kernel, MemFlags, Program, Queue};
use rand::RngCore;

use crate::error::SearchError;
use crate::search::SearchContext;
use crate::validator::{validate_hit, Validation};

const RES_SLOTS: usize = 1024;
const RES_SLOT_WORDS: usize = 3;
const RES_WORDS: usize = RES_SLOTS * RES_SLOT_WORDS;

/// Deterministic per-device dispatch parameters. No autotune loop: picked
/// once from vendor string and compute-unit count.
#[derive(Debug, Clone, Copy)]
pub struct DeviceParams {
    pub global_threads: u32,
    pub local_size: Option<usize>,
    pub iterations: i32,
}

/// Choose `(global_threads, local_size, iterations)` for a device from a
/// fixed per-vendor/compute-unit lookup, then fold in the StateInit variant
/// count and the device's max work-group size.
pub fn pick_device_params(vendor: &str, compute_units: u32, max_work_group_size: usize, n_variants: usize) -> DeviceParams {
    let vendor_lower = vendor.to_lowercase();
    let cu = compute_units.max(1);

    let (base_threads, mut local, mut iters) = if vendor_lower.contains("nvidia") {
        (cu * 2048, 256usize, 4096i32)
    } else if vendor_lower.contains("advanced micro devices") || vendor_lower.contains("amd") {
        (cu * 2048, 256usize, 4096i32)
    } else if vendor_lower.contains("apple") {
        (cu * 1024, 256usize, 2048i32)
    } else {
        (cu * 1024, 128usize, 2048i32)
    };

    if n_variants > 0 {
        iters = (iters / n_variants as i32).max(512);
    }
    local = local.min(max_work_group_size.max(1));

    DeviceParams {
        global_threads: base_threads,
        local_size: Some(local),
        iterations: iters,
    }
}

/// Owns one device's command queue, kernel object, and result buffers.
pub struct DeviceWorker {
    queue: Queue,
    kernel: Kernel,
    found_count_buf: Buffer<u32>,
    result_slots_buf: Buffer<u32>,
    params: DeviceParams,
}

impl DeviceWorker {
    pub fn new(device: Device, context: &Context, program: &Program, ctx: &SearchContext) -> ocl::Result<Self> {
        let vendor = device.vendor()?;
        let compute_units = device
            .info(ocl::enums::DeviceInfo::MaxComputeUnits)
            .ok()
            .and_then(|info| info.to_string().parse::<u32>().ok())
            .unwrap_or(1);
        let max_wg = device.max_wg_size().unwrap_or(256);

        let params = pick_device_params(&vendor, compute_units, max_wg, ctx.kernel_cfg.stateinit_variants.len());

        let queue = Queue::new(context, device, None)?;

        let found_count_buf = Buffer::<u32>::builder()
            .queue(queue.clone())
            .flags(MemFlags::new().read_write())
            .len(1)
            .build()?;
        let result_slots_buf = Buffer::<u32>::builder()
            .queue(queue.clone())
            .flags(MemFlags::new().read_write())
            .len(RES_WORDS)
            .build()?;

        let kernel = Kernel::builder()
            .program(program)
            .name("hash_main")
            .queue(queue.clone())
            .global_work_size(params.global_threads as usize)
            .arg(0i32)
            .arg(0u32)
            .arg(0u32)
            .arg(0u32)
            .arg(0u32)
            .arg(&found_count_buf)
            .arg(&result_slots_buf)
            .build()?;

        Ok(Self {
            queue,
            kernel,
            found_count_buf,
            result_slots_buf,
            params,
        })
    }

    /// Run batches until `ctx.stop_flag` is set. Returns `Err` only on a
    /// fatal kernel/host disagreement or an OpenCL failure.
    pub fn run(&mut self, ctx: &Arc<SearchContext>) -> Result<(), SearchError> {
        let mut rng = rand::thread_rng();

        while !ctx.stop_flag.load(Ordering::SeqCst) {
            // 1. Fresh cryptographically random 16-byte base salt.
            let mut base_salt = [0u8; 16];
            rng.fill_bytes(&mut base_salt);
            let salt_words: [u32; 4] = std::array::from_fn(|i| {
                u32::from_le_bytes(base_salt[i * 4..i * 4 + 4].try_into().unwrap())
            });

            // 2. Zero the shared found_count counter on the device.
            self.found_count_buf.cmd().fill(0u32, None).enq()?;

            self.kernel.set_arg(0, self.params.iterations)?;
            self.kernel.set_arg(1, salt_words[0])?;
            self.kernel.set_arg(2, salt_words[1])?;
            self.kernel.set_arg(3, salt_words[2])?;
            self.kernel.set_arg(4, salt_words[3])?;

            let start = Instant::now();

            // 3. Launch the kernel over global_threads work items.
            unsafe {
                self.kernel.enq()?;
            }
            self.queue.finish()?;

            // 4. Read found_count and, if any hits, copy result slots back.
            let mut found_count_host = vec![0u32; 1];
            self.found_count_buf.read(&mut found_count_host).enq()?;
            let count = found_count_host[0] as usize;

            if count > 0 {
                let mut res_host = vec![0u32; RES_WORDS];
                self.result_slots_buf.read(&mut res_host).enq()?;

                for slot in 0..count.min(RES_SLOTS) {
                    let iter_idx = res_host[slot * RES_SLOT_WORDS];
                    let idx = res_host[slot * RES_SLOT_WORDS + 1];
                    let variant_idx = res_host[slot * RES_SLOT_WORDS + 2];

                    let now = std::time::SystemTime::now()
                        .duration_since(std::time::UNIX_EPOCH)
                        .unwrap()
                        .as_secs_f64();

                    // 5. Validate on host; any failure is fatal.
                    match validate_hit(&ctx.cfg, &ctx.kernel_cfg, base_salt, iter_idx, idx, variant_idx, now) {
                        Validation::Match(record) => {
                            ctx.sink.append(&record)?;
                            ctx.n_found.fetch_add(1, Ordering::SeqCst);
                            log::info!("found match: {}", record.address);

                            // 6. only_one mode: stop after the first persist.
                            if ctx.cfg.only_one {
                                ctx.stop_flag.store(true, Ordering::SeqCst);
                            }
                        }
                        Validation::Rejected(reason) => {
                            ctx.stop_flag.store(true, Ordering::SeqCst);
                            return Err(SearchError::Validation {
                                iter_idx,
                                idx,
                                variant_idx,
                                reason,
                            });
                        }
                    }

                    if ctx.stop_flag.load(Ordering::SeqCst) {
                        break;
                    }
                }
            }

            // 7. Update the shared status snapshot.
            let elapsed = start.elapsed().as_secs_f64();
            let n_variants = ctx.kernel_cfg.stateinit_variants.len();
            let total_batch_iters = (self.params.global_threads as f64) * (self.params.iterations as f64) * (n_variants as f64);
            let speed_raw = if elapsed > 0.0 {
                (self.params.global_threads as f64) * (self.params.iterations as f64) / elapsed / 1e6
            } else {
                0.0
            };
            let speed_eff = speed_raw * n_variants as f64;

            {
                let mut status = ctx.status.lock().expect("status mutex poisoned");
                status.speed_raw = speed_raw;
                status.speed_eff = speed_eff;
                status.batch_time = elapsed;
                status.found = ctx.n_found.load(Ordering::SeqCst);
                status.threads = self.params.global_threads;
                status.iterations = self.params.iterations;
                status.local = self.params.local_size;
                status.variants = n_variants;
                status.updated = now_secs();
            }
            *ctx.total_iters.lock().expect("total_iters mutex poisoned") += total_batch_iters;
        }

        Ok(())
    }
}

fn now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nvidia_vendor_picks_high_thread_count() {
        let p = pick_device_params("NVIDIA Corporation", 20, 1024, 5);
        assert_eq!(p.global_threads, 20 * 2048);
        assert_eq!(p.local_size, Some(256));
        assert_eq!(p.iterations, (4096 / 5).max(512));
    }

    #[test]
    fn apple_vendor_uses_lower_iteration_baseline() {
        let p = pick_device_params("Apple", 8, 1024, 0);
        assert_eq!(p.global_threads, 8 * 1024);
        assert_eq!(p.iterations, 2048);
    }

    #[test]
    fn other_vendor_falls_back_to_intel_cpu_table() {
        let p = pick_device_params("Intel(R) Corporation", 4, 64, 45);
        assert_eq!(p.global_threads, 4 * 1024);
        assert_eq!(p.local_size, Some(64)); // clamped to max_work_group_size
        assert_eq!(p.iterations, 512); // floor at 512
    }

    #[test]
    fn local_size_clamped_to_device_max_work_group_size() {
        let p = pick_device_params("NVIDIA", 4, 32, 1);
        assert_eq!(p.local_size, Some(32));
    }
}
