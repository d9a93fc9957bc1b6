//! Orchestration: enumerates OpenCL devices, builds one context/program per
//! platform, then builds the shared `SearchContext` and drives one worker
//! thread per device plus the reporter thread, tearing everything down
//! cleanly on stop.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use ocl::{Context, Device, DeviceType, Platform, Program};

use crate::config::SearchConfig;
use crate::error::{SearchError, SetupError};
use crate::kernel_render::{render_kernel, KERNEL_TEMPLATE};
use crate::pattern::{KernelConfig, PatternCompiler};
use crate::status;
use crate::validator::Sink;
use crate::worker::DeviceWorker;

const RESULT_FILE: &str = "addresses.jsonl";

/// Process-wide shared state. Constructed once in `run_search`, shared by
/// reference to every worker, torn down in reverse order on exit.
pub struct SearchContext {
    pub cfg: SearchConfig,
    pub kernel_cfg: KernelConfig,
    pub stop_flag: AtomicBool,
    pub n_found: AtomicU32,
    pub total_iters: Mutex<f64>,
    pub status: Mutex<status::SearchStats>,
    pub sink: Sink,
}

impl SearchContext {
    fn new(cfg: SearchConfig, kernel_cfg: KernelConfig) -> Result<Self, SearchError> {
        let variants = kernel_cfg.stateinit_variants.len();
        Ok(Self {
            cfg,
            kernel_cfg,
            stop_flag: AtomicBool::new(false),
            n_found: AtomicU32::new(0),
            total_iters: Mutex::new(0.0),
            status: Mutex::new(status::SearchStats {
                variants,
                ..Default::default()
            }),
            sink: Sink::open(RESULT_FILE)?,
        })
    }
}

/// Enumerate OpenCL devices, preferring GPUs and falling back to any device
/// type, grouped by platform so devices on the same platform can share one
/// compiled program.
fn enumerate_device_groups() -> Result<Vec<(Platform, Vec<Device>)>, SetupError> {
    let platforms = Platform::list();
    let mut groups: Vec<(Platform, Vec<Device>)> = Vec::new();
    for platform in &platforms {
        if let Ok(gpus) = Device::list(*platform, Some(DeviceType::GPU)) {
            if !gpus.is_empty() {
                groups.push((*platform, gpus));
            }
        }
    }
    if groups.is_empty() {
        for platform in &platforms {
            if let Ok(all) = Device::list(*platform, Some(DeviceType::ALL)) {
                if !all.is_empty() {
                    groups.push((*platform, all));
                }
            }
        }
    }
    if groups.is_empty() {
        return Err(SetupError::NoDevices);
    }
    Ok(groups)
}

/// Entry point for the search: compile the pattern, render the kernel,
/// enumerate devices and build every context/program up front, then only
/// once setup has fully succeeded build the shared context (which opens the
/// result sink), fan out one worker thread per device, run the reporter,
/// and join everything on stop.
pub fn run_search(cfg: SearchConfig) -> Result<(), SearchError> {
    let kernel_cfg = PatternCompiler::compile(&cfg)?;
    let kernel_src = render_kernel(KERNEL_TEMPLATE, &kernel_cfg)?;

    let groups = enumerate_device_groups()?;

    // Build every context/program first: any OpenCL failure here must abort
    // before the result sink is ever created.
    let mut built: Vec<(Context, Program, Vec<Device>)> = Vec::with_capacity(groups.len());
    for (platform, devs) in groups {
        let context = Context::builder().platform(platform).devices(devs.as_slice()).build()?;
        let program = Program::builder().devices(devs.as_slice()).src(kernel_src.clone()).build(&context)?;
        built.push((context, program, devs));
    }

    let ctx = Arc::new(SearchContext::new(cfg, kernel_cfg)?);

    let stop_for_signal = ctx.clone();
    ctrlc::set_handler(move || {
        log::warn!("interrupted, stopping workers");
        stop_for_signal.stop_flag.store(true, Ordering::SeqCst);
    })
    .expect("failed to register Ctrl-C handler");

    let mut threads = Vec::new();
    for (context, program, devs) in built {
        for device in devs {
            log::info!("using device: {}", device.name().unwrap_or_else(|_| "<unknown>".to_string()));
            let ctx = ctx.clone();
            let context = context.clone();
            let program = program.clone();
            threads.push(std::thread::spawn(move || -> Result<(), SearchError> {
                let mut worker = DeviceWorker::new(device, &context, &program, &ctx)?;
                worker.run(&ctx)
            }));
        }
    }

    let reporter_ctx = ctx.clone();
    let reporter = std::thread::spawn(move || status::run(reporter_ctx));

    let mut first_error = None;
    for handle in threads {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                ctx.stop_flag.store(true, Ordering::SeqCst);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
            Err(_) => {
                ctx.stop_flag.store(true, Ordering::SeqCst);
            }
        }
    }

    ctx.stop_flag.store(true, Ordering::SeqCst);
    let _ = reporter.join();

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
