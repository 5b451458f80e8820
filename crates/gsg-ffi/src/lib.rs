mod context;
mod error;
mod types;

pub use context::*;
pub use error::*;
pub use types::*;

use std::ffi::CString;
use std::os::raw::c_char;

use gsg_grouped::{GroupPointers, GroupedGemmError, ProblemDescriptor, StreamConfig};
use gsg_tensor::DevicePtr;

/// Execute a closure that returns a `GsgStatus`, catching any panics
/// and converting them into `GsgStatus::ErrorInternal`.
fn catch_panic<F: FnOnce() -> GsgStatus + std::panic::UnwindSafe>(f: F) -> GsgStatus {
    match std::panic::catch_unwind(f) {
        Ok(status) => status,
        Err(_) => {
            set_last_error("internal panic".to_string());
            GsgStatus::ErrorInternal
        }
    }
}

fn null_argument(what: &str) -> GsgStatus {
    set_last_error(format!("{} is null", what));
    GsgStatus::ErrorInvalidArgument
}

/// Create a context for an emulated accelerator of the given generation.
///
/// On success, writes a heap-allocated `GsgContext` pointer into `*ctx_out`.
/// The caller must later call `gsg_context_destroy`.
#[no_mangle]
pub extern "C" fn gsg_context_create(generation: GsgGeneration, ctx_out: *mut *mut GsgContext) -> GsgStatus {
    catch_panic(|| {
        if ctx_out.is_null() {
            return null_argument("ctx_out");
        }
        let ctx = Box::new(GsgContext::new(generation.into()));
        log::debug!("created context on {}", ctx.device.name());
        unsafe {
            *ctx_out = Box::into_raw(ctx);
        }
        GsgStatus::Ok
    })
}

/// Destroy a context previously created by `gsg_context_create`.
///
/// Passing a null pointer is a no-op and returns `GsgStatus::Ok`.
#[no_mangle]
pub unsafe extern "C" fn gsg_context_destroy(ctx: *mut GsgContext) -> GsgStatus {
    if ctx.is_null() {
        return GsgStatus::Ok;
    }
    drop(Box::from_raw(ctx));
    GsgStatus::Ok
}

/// Allocate a zeroed device buffer of `len` elements and write its handle
/// into `*ptr_out`.
#[no_mangle]
pub unsafe extern "C" fn gsg_buffer_alloc(
    ctx: *mut GsgContext,
    dtype: GsgDType,
    len: u64,
    ptr_out: *mut u64,
) -> GsgStatus {
    catch_panic(|| {
        if ctx.is_null() || ptr_out.is_null() {
            return null_argument("ctx or ptr_out");
        }
        let ctx = unsafe { &mut *ctx };
        let ptr = ctx.device.memory_mut().alloc(dtype.into(), len as usize);
        match ptr.to_raw() {
            Ok(raw) => {
                unsafe {
                    *ptr_out = raw;
                }
                GsgStatus::Ok
            }
            Err(e) => fail(e.into()),
        }
    })
}

/// Copy `len` host floats into device memory at `ptr`, rounding to the
/// buffer's element type.
#[no_mangle]
pub unsafe extern "C" fn gsg_buffer_write(
    ctx: *mut GsgContext,
    ptr: u64,
    data: *const f32,
    len: u64,
) -> GsgStatus {
    catch_panic(|| {
        if ctx.is_null() || (data.is_null() && len > 0) {
            return null_argument("ctx or data");
        }
        let ctx = unsafe { &mut *ctx };
        let host = if len == 0 {
            &[][..]
        } else {
            unsafe { std::slice::from_raw_parts(data, len as usize) }
        };
        match ctx.device.memory_mut().write(DevicePtr::from_raw(ptr), host) {
            Ok(()) => GsgStatus::Ok,
            Err(e) => fail(e.into()),
        }
    })
}

/// Copy `len` elements at `ptr` back to host memory as floats.
#[no_mangle]
pub unsafe extern "C" fn gsg_buffer_read(
    ctx: *mut GsgContext,
    ptr: u64,
    out: *mut f32,
    len: u64,
) -> GsgStatus {
    catch_panic(|| {
        if ctx.is_null() || (out.is_null() && len > 0) {
            return null_argument("ctx or out");
        }
        let ctx = unsafe { &*ctx };
        let values = match ctx.device.memory().read(DevicePtr::from_raw(ptr), len as usize) {
            Ok(v) => v,
            Err(e) => return fail(e.into()),
        };
        if !values.is_empty() {
            unsafe {
                std::ptr::copy_nonoverlapping(values.as_ptr(), out, values.len());
            }
        }
        GsgStatus::Ok
    })
}

/// Build a grouped argument from per-group pointers and problems.
///
/// `acc_scale` multiplies every score before the softmax. The counts must
/// agree; otherwise `GsgStatus::ErrorGroupCountMismatch` is returned. The
/// caller must later call `gsg_argument_destroy`.
#[no_mangle]
pub unsafe extern "C" fn gsg_argument_create(
    config: GsgTileConfig,
    pointers: *const GsgGroupPointers,
    pointer_count: u64,
    problems: *const GsgProblem,
    problem_count: u64,
    acc_scale: f32,
    arg_out: *mut *mut GsgArgument,
) -> GsgStatus {
    catch_panic(|| {
        if arg_out.is_null()
            || (pointers.is_null() && pointer_count > 0)
            || (problems.is_null() && problem_count > 0)
        {
            return null_argument("pointers, problems or arg_out");
        }
        let raw_pointers = if pointer_count == 0 {
            &[][..]
        } else {
            unsafe { std::slice::from_raw_parts(pointers, pointer_count as usize) }
        };
        let raw_problems = if problem_count == 0 {
            &[][..]
        } else {
            unsafe { std::slice::from_raw_parts(problems, problem_count as usize) }
        };

        let pointers: Vec<GroupPointers> = raw_pointers.iter().map(GsgGroupPointers::to_pointers).collect();
        let problems: Result<Vec<ProblemDescriptor>, GroupedGemmError> =
            raw_problems.iter().map(GsgProblem::to_descriptor).collect();
        let problems = match problems {
            Ok(p) => p,
            Err(e) => return fail(e),
        };

        match GsgArgument::new(config, &pointers, &problems, acc_scale) {
            Ok(arg) => {
                unsafe {
                    *arg_out = Box::into_raw(Box::new(arg));
                }
                GsgStatus::Ok
            }
            Err(e) => fail(e),
        }
    })
}

/// Destroy an argument previously created by `gsg_argument_create`.
#[no_mangle]
pub unsafe extern "C" fn gsg_argument_destroy(arg: *mut GsgArgument) -> GsgStatus {
    if arg.is_null() {
        return GsgStatus::Ok;
    }
    drop(Box::from_raw(arg));
    GsgStatus::Ok
}

/// Bytes of device workspace the argument needs for its group metadata.
#[no_mangle]
pub unsafe extern "C" fn gsg_argument_workspace_size(arg: *const GsgArgument, size_out: *mut u64) -> GsgStatus {
    catch_panic(|| {
        if arg.is_null() || size_out.is_null() {
            return null_argument("arg or size_out");
        }
        let arg = unsafe { &*arg };
        unsafe {
            *size_out = arg.workspace_size() as u64;
        }
        GsgStatus::Ok
    })
}

/// Attach a workspace of `capacity_bytes` to the argument.
#[no_mangle]
pub unsafe extern "C" fn gsg_argument_set_workspace(arg: *mut GsgArgument, capacity_bytes: u64) -> GsgStatus {
    catch_panic(|| {
        if arg.is_null() {
            return null_argument("arg");
        }
        let arg = unsafe { &mut *arg };
        arg.set_workspace(capacity_bytes as usize);
        GsgStatus::Ok
    })
}

/// Write 1 into `*supported_out` if the argument can run on the context's
/// device, 0 otherwise. The reason for a rejection is logged at debug level.
#[no_mangle]
pub unsafe extern "C" fn gsg_argument_is_supported(
    ctx: *const GsgContext,
    arg: *const GsgArgument,
    supported_out: *mut u8,
) -> GsgStatus {
    catch_panic(|| {
        if ctx.is_null() || arg.is_null() || supported_out.is_null() {
            return null_argument("ctx, arg or supported_out");
        }
        let (ctx, arg) = unsafe { (&*ctx, &*arg) };
        unsafe {
            *supported_out = u8::from(arg.is_supported(&ctx.device));
        }
        GsgStatus::Ok
    })
}

/// Descriptive name of the argument's operator instance.
///
/// The string must be freed with `gsg_free_string`.
#[no_mangle]
pub unsafe extern "C" fn gsg_argument_type_string(arg: *const GsgArgument, out: *mut *mut c_char) -> GsgStatus {
    catch_panic(|| {
        if arg.is_null() || out.is_null() {
            return null_argument("arg or out");
        }
        let arg = unsafe { &*arg };
        match CString::new(arg.type_string()) {
            Ok(s) => {
                unsafe {
                    *out = s.into_raw();
                }
                GsgStatus::Ok
            }
            Err(e) => {
                set_last_error(format!("type string encoding error: {}", e));
                GsgStatus::ErrorInternal
            }
        }
    })
}

/// Launch the grouped computation.
///
/// Stream options are read from the environment (`GSG_TIMED_ITERATIONS`,
/// `GSG_BLOCK_ORDER`); `time_kernel` overrides `GSG_TIME_KERNEL`. When timing,
/// the mean milliseconds per launch are written to `*elapsed_ms_out` if it is
/// non-null; otherwise 0 is written.
#[no_mangle]
pub unsafe extern "C" fn gsg_run(
    ctx: *mut GsgContext,
    arg: *mut GsgArgument,
    time_kernel: bool,
    elapsed_ms_out: *mut f32,
) -> GsgStatus {
    catch_panic(|| {
        if ctx.is_null() || arg.is_null() {
            return null_argument("ctx or arg");
        }
        let (ctx, arg) = unsafe { (&mut *ctx, &mut *arg) };
        let config = StreamConfig {
            time_kernel,
            ..StreamConfig::from_env()
        };
        match arg.run(&mut ctx.device, &config) {
            Ok(ms) => {
                if !elapsed_ms_out.is_null() {
                    unsafe {
                        *elapsed_ms_out = ms;
                    }
                }
                GsgStatus::Ok
            }
            Err(e) => fail(e),
        }
    })
}

/// Get the last error message for the calling thread.
///
/// Returns null if there is none. The string must be freed with
/// `gsg_free_string`.
#[no_mangle]
pub extern "C" fn gsg_last_error() -> *const c_char {
    match error::take_last_error() {
        Some(e) => e.into_raw(),
        None => std::ptr::null(),
    }
}

/// Free a string previously returned by `gsg_argument_type_string` or
/// `gsg_last_error`.
#[no_mangle]
pub unsafe extern "C" fn gsg_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gsg_grouped::{Fp32Tile64x64x32, OperandLayouts};
    use std::ffi::CStr;

    fn ffi_problem(p: &ProblemDescriptor) -> GsgProblem {
        let mut output_lengths = [0u64; GSG_MAX_OUTPUT_DIMS];
        let mut output_strides = [0u64; GSG_MAX_OUTPUT_DIMS];
        for (i, (&l, &s)) in p.output.lengths().iter().zip(p.output.strides()).enumerate() {
            output_lengths[i] = l as u64;
            output_strides[i] = s as u64;
        }
        GsgProblem {
            m: p.m as u64,
            n: p.n as u64,
            k: p.k as u64,
            o: p.o as u64,
            batch_count: p.batch_count as u64,
            stride_a: p.stride_a as u64,
            stride_b0: p.stride_b0 as u64,
            stride_b1: p.stride_b1 as u64,
            batch_stride_a: p.batch_stride_a as u64,
            batch_stride_b0: p.batch_stride_b0 as u64,
            batch_stride_b1: p.batch_stride_b1 as u64,
            num_g: p.output.num_g() as u32,
            num_m: p.output.num_m() as u32,
            num_o: p.output.num_o() as u32,
            output_lengths,
            output_strides,
        }
    }

    unsafe fn alloc(ctx: *mut GsgContext, data: &[f32]) -> u64 {
        let mut ptr = 0u64;
        assert_eq!(gsg_buffer_alloc(ctx, GsgDType::F32, data.len() as u64, &mut ptr), GsgStatus::Ok);
        assert_eq!(gsg_buffer_write(ctx, ptr, data.as_ptr(), data.len() as u64), GsgStatus::Ok);
        ptr
    }

    #[test]
    fn test_run_through_c_abi() {
        unsafe {
            let mut ctx = std::ptr::null_mut();
            assert_eq!(gsg_context_create(GsgGeneration::Gfx90a, &mut ctx), GsgStatus::Ok);

            // Zero scores make the softmax uniform over N, so every output row
            // is the column mean of B1.
            let desc =
                ProblemDescriptor::packed(2, 2, 4, 4, 1, OperandLayouts::of::<Fp32Tile64x64x32>()).unwrap();
            let pointers = GsgGroupPointers {
                a: alloc(ctx, &[1.0; 8]),
                b0: alloc(ctx, &[0.0; 8]),
                b1: alloc(ctx, &[1.0, 2.0, 3.0, 4.0, 3.0, 4.0, 5.0, 6.0]),
                c: alloc(ctx, &[0.0; 8]),
            };
            let problem = ffi_problem(&desc);

            let mut arg = std::ptr::null_mut();
            assert_eq!(
                gsg_argument_create(GsgTileConfig::Fp32Tile64x64x32, &pointers, 1, &problem, 1, 1.0, &mut arg),
                GsgStatus::Ok
            );

            let mut supported = 0u8;
            assert_eq!(gsg_argument_is_supported(ctx, arg, &mut supported), GsgStatus::Ok);
            assert_eq!(supported, 1);

            // Running before a workspace is attached fails.
            assert_eq!(gsg_run(ctx, arg, false, std::ptr::null_mut()), GsgStatus::ErrorWorkspace);
            let msg = gsg_last_error();
            assert!(!msg.is_null());
            gsg_free_string(msg as *mut c_char);

            let mut size = 0u64;
            assert_eq!(gsg_argument_workspace_size(arg, &mut size), GsgStatus::Ok);
            assert!(size > 0);
            assert_eq!(gsg_argument_set_workspace(arg, size), GsgStatus::Ok);

            let mut elapsed = -1.0f32;
            assert_eq!(gsg_run(ctx, arg, false, &mut elapsed), GsgStatus::Ok);
            assert_eq!(elapsed, 0.0);

            let mut c = [0.0f32; 8];
            assert_eq!(gsg_buffer_read(ctx, pointers.c, c.as_mut_ptr(), 8), GsgStatus::Ok);
            let expected = [2.0, 3.0, 4.0, 5.0, 2.0, 3.0, 4.0, 5.0];
            for (x, y) in c.iter().zip(&expected) {
                assert!((x - y).abs() < 1e-5, "{:?} != {:?}", c, expected);
            }

            let mut name = std::ptr::null_mut();
            assert_eq!(gsg_argument_type_string(arg, &mut name), GsgStatus::Ok);
            let s = CStr::from_ptr(name).to_str().unwrap().to_string();
            assert!(s.starts_with("DeviceGroupedGemmSoftmaxGemm<256, 64, 64, 32"));
            gsg_free_string(name);

            assert_eq!(gsg_argument_destroy(arg), GsgStatus::Ok);
            assert_eq!(gsg_context_destroy(ctx), GsgStatus::Ok);
        }
    }

    #[test]
    fn test_group_count_mismatch_status() {
        unsafe {
            let desc =
                ProblemDescriptor::packed(4, 4, 4, 4, 1, OperandLayouts::of::<Fp32Tile64x64x32>()).unwrap();
            let problem = ffi_problem(&desc);
            let pointers = [GsgGroupPointers { a: 0, b0: 0, b1: 0, c: 0 }; 2];
            let mut arg = std::ptr::null_mut();
            let status = gsg_argument_create(
                GsgTileConfig::Fp32Tile64x64x32,
                pointers.as_ptr(),
                2,
                &problem,
                1,
                1.0,
                &mut arg,
            );
            assert_eq!(status, GsgStatus::ErrorGroupCountMismatch);
            assert!(arg.is_null());
            let msg = gsg_last_error();
            assert!(!msg.is_null());
            gsg_free_string(msg as *mut c_char);
        }
    }

    #[test]
    fn test_undersized_buffer_status() {
        unsafe {
            let mut ctx = std::ptr::null_mut();
            assert_eq!(gsg_context_create(GsgGeneration::Gfx90a, &mut ctx), GsgStatus::Ok);
            let desc =
                ProblemDescriptor::packed(2, 2, 4, 4, 1, OperandLayouts::of::<Fp32Tile64x64x32>()).unwrap();
            let pointers = GsgGroupPointers {
                a: alloc(ctx, &[1.0; 8]),
                b0: alloc(ctx, &[0.0; 8]),
                b1: alloc(ctx, &[1.0; 8]),
                c: alloc(ctx, &[0.0; 2]),
            };
            let problem = ffi_problem(&desc);
            let mut arg = std::ptr::null_mut();
            assert_eq!(
                gsg_argument_create(GsgTileConfig::Fp32Tile64x64x32, &pointers, 1, &problem, 1, 1.0, &mut arg),
                GsgStatus::Ok
            );

            let mut supported = 1u8;
            assert_eq!(gsg_argument_is_supported(ctx, arg, &mut supported), GsgStatus::Ok);
            assert_eq!(supported, 0);

            let mut size = 0u64;
            assert_eq!(gsg_argument_workspace_size(arg, &mut size), GsgStatus::Ok);
            assert_eq!(gsg_argument_set_workspace(arg, size), GsgStatus::Ok);
            assert_eq!(gsg_run(ctx, arg, false, std::ptr::null_mut()), GsgStatus::ErrorInvalidArgument);
            let msg = gsg_last_error();
            let text = CStr::from_ptr(msg).to_str().unwrap().to_string();
            assert!(text.contains("C buffer holds 2 elements"), "{}", text);
            gsg_free_string(msg as *mut c_char);

            assert_eq!(gsg_argument_destroy(arg), GsgStatus::Ok);
            assert_eq!(gsg_context_destroy(ctx), GsgStatus::Ok);
        }
    }

    #[test]
    fn test_null_arguments_are_rejected() {
        assert_eq!(
            gsg_context_create(GsgGeneration::Gfx908, std::ptr::null_mut()),
            GsgStatus::ErrorInvalidArgument
        );
        unsafe {
            assert_eq!(gsg_context_destroy(std::ptr::null_mut()), GsgStatus::Ok);
            assert_eq!(gsg_argument_destroy(std::ptr::null_mut()), GsgStatus::Ok);
        }
    }
}
