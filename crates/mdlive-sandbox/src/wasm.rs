//! WebAssembly execution contexts backed by wasmtime.
//!
//! Fragments are WebAssembly modules in text or binary form. A fragment may
//! export a nullary `run` function, which is called right after instantiation.
//! It talks to the outside world only through the granted host modules:
//!
//! | import | effect |
//! |--------|--------|
//! | `host.print(ptr, len)` | append UTF-8 text to the fragment output |
//! | `host.warn(ptr, len)` | raise a warning diagnostic |
//! | `host.error(ptr, len)` | raise an error diagnostic |
//! | `host.fail(ptr, len)` | abort the fragment with a runtime error |
//!
//! Strings are read from the memory exported as `memory` by the calling module.
//!
//! All fragments of a context draw from one program-space budget: linear
//! memories, tables and the output of the running fragment are charged
//! against the configured memory limit.
//!
//! Every fragment that runs successfully has its exports registered under the
//! `doc` import module, so later fragments of the same document can import the
//! functions, globals and memories defined by earlier ones. A later export with
//! the same name replaces the earlier one.

use std::{thread::JoinHandle, time::Duration};

use crossbeam_channel::{RecvTimeoutError, Sender};
use thiserror::Error;
use wasmtime::{Caller, Config, Engine, Extern, Instance, Linker, Module, Store, Trap};

use crate::{
    error::{ExecError, SandboxError},
    options::{EvalOptions, HOST_MODULE},
    quota::{Quota, QuotaExceeded},
    runtime::{Context, ContextId, Runtime, UnitId},
};

/// Import module under which earlier fragments' exports are visible.
pub const SHARED_MODULE: &str = "doc";

const ENTRY_POINT: &str = "run";
const MEMORY_EXPORT: &str = "memory";

#[derive(Debug, Error)]
#[error("{0}")]
struct GuestFailure(String);

struct HostState {
    quota: Quota,
    output: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WasmRuntime;

impl Runtime for WasmRuntime {
    type Context = WasmContext;

    fn create_context(&self, options: &EvalOptions) -> Result<Self::Context, SandboxError> {
        WasmContext::new(options)
    }
}

pub struct WasmContext {
    id: ContextId,
    engine: Engine,
    store: Store<HostState>,
    linker: Linker<HostState>,
}

impl WasmContext {
    pub fn new(options: &EvalOptions) -> Result<Self, SandboxError> {
        let mut config = Config::new();
        config.epoch_interruption(true).wasm_backtrace(false);
        let engine = Engine::new(&config).map_err(|e| SandboxError::Engine(e.to_string()))?;

        let mut store = Store::new(
            &engine,
            HostState {
                quota: Quota::new(options.memory_limit()),
                output: String::new(),
            },
        );
        store.limiter(|state| &mut state.quota);

        let mut linker = Linker::new(&engine);
        linker.allow_shadowing(true);
        for module in options.capabilities().modules() {
            match module {
                HOST_MODULE => define_host_module(&mut linker)
                    .map_err(|e| SandboxError::Engine(e.to_string()))?,
                other => return Err(SandboxError::UnknownCapability(other.to_string())),
            }
        }

        let id = ContextId::next();
        tracing::debug!(context = %id, memory_limit = options.memory_limit(), "execution context created");

        Ok(Self {
            id,
            engine,
            store,
            linker,
        })
    }

    fn check_imports(&self, module: &Module, options: &EvalOptions) -> Result<(), ExecError> {
        match module.imports().find(|import| {
            import.module() != SHARED_MODULE && !options.capabilities().allows(import.module())
        }) {
            Some(import) => Err(ExecError::Compile(format!(
                "import \"{}\" \"{}\" is not granted",
                import.module(),
                import.name()
            ))),
            None => Ok(()),
        }
    }

    fn instantiate_and_call(&mut self, module: &Module) -> wasmtime::Result<Instance> {
        let instance = self.linker.instantiate(&mut self.store, module)?;

        if let Some(entry) = instance.get_func(&mut self.store, ENTRY_POINT) {
            entry
                .typed::<(), ()>(&self.store)?
                .call(&mut self.store, ())?;
        }

        Ok(instance)
    }
}

impl Context for WasmContext {
    fn id(&self) -> ContextId {
        self.id
    }

    fn run(
        &mut self,
        unit: UnitId,
        code: &str,
        options: &EvalOptions,
    ) -> Result<String, ExecError> {
        let span = tracing::debug_span!("fragment", unit = %unit);
        let _enter = span.enter();

        let module = Module::new(&self.engine, code)
            .map_err(|e| ExecError::Compile(format!("{:#}", e)))?;
        self.check_imports(&module, options)?;

        let required = module.resources_required();
        self.store
            .data_mut()
            .quota
            .admit(required.num_memories as usize, required.num_tables as usize)
            .map_err(|e| ExecError::ResourceExceeded(e.0))?;

        self.store.data_mut().output.clear();
        self.store.set_epoch_deadline(1);

        let watchdog = Watchdog::arm(self.engine.clone(), options.time_limit())?;
        let result = self.instantiate_and_call(&module);
        let expired = watchdog.disarm();
        let state = self.store.data_mut();
        let output = std::mem::take(&mut state.output);
        state.quota.release_output();

        match result {
            Ok(instance) => {
                self.linker
                    .instance(&mut self.store, SHARED_MODULE, instance)
                    .map_err(|e| ExecError::Runtime(format!("{:#}", e)))?;
                tracing::debug!(
                    bytes = output.len(),
                    used = self.store.data().quota.used(),
                    "fragment completed"
                );
                Ok(output)
            }
            Err(e) => {
                let err = classify_error(e, options.time_limit());
                tracing::debug!(expired, error = %err, "fragment failed");
                Err(err)
            }
        }
    }
}

impl Drop for WasmContext {
    fn drop(&mut self) {
        tracing::debug!(context = %self.id, "execution context released");
    }
}

fn define_host_module(linker: &mut Linker<HostState>) -> wasmtime::Result<()> {
    linker.func_wrap(
        HOST_MODULE,
        "print",
        |mut caller: Caller<'_, HostState>, ptr: i32, len: i32| -> wasmtime::Result<()> {
            let text = read_guest_str(&mut caller, ptr, len)?;
            let state = caller.data_mut();
            state.quota.charge_output(text.len())?;
            state.output.push_str(&text);
            Ok(())
        },
    )?;
    linker.func_wrap(
        HOST_MODULE,
        "warn",
        |mut caller: Caller<'_, HostState>, ptr: i32, len: i32| -> wasmtime::Result<()> {
            let text = read_guest_str(&mut caller, ptr, len)?;
            tracing::warn!("{}", text);
            Ok(())
        },
    )?;
    linker.func_wrap(
        HOST_MODULE,
        "error",
        |mut caller: Caller<'_, HostState>, ptr: i32, len: i32| -> wasmtime::Result<()> {
            let text = read_guest_str(&mut caller, ptr, len)?;
            tracing::error!("{}", text);
            Ok(())
        },
    )?;
    linker.func_wrap(
        HOST_MODULE,
        "fail",
        |mut caller: Caller<'_, HostState>, ptr: i32, len: i32| -> wasmtime::Result<()> {
            let text = read_guest_str(&mut caller, ptr, len)?;
            Err(wasmtime::Error::new(GuestFailure(text)))
        },
    )?;

    Ok(())
}

fn read_guest_str(
    caller: &mut Caller<'_, HostState>,
    ptr: i32,
    len: i32,
) -> wasmtime::Result<String> {
    let memory = caller
        .get_export(MEMORY_EXPORT)
        .and_then(Extern::into_memory)
        .ok_or_else(|| wasmtime::Error::msg("fragment does not export a memory"))?;
    let start = usize::try_from(ptr)?;
    let end = start
        .checked_add(usize::try_from(len)?)
        .ok_or_else(|| wasmtime::Error::msg("string length overflows"))?;
    let bytes = memory
        .data(&*caller)
        .get(start..end)
        .ok_or_else(|| wasmtime::Error::msg("string is outside of the fragment memory"))?;

    Ok(String::from_utf8_lossy(bytes).into_owned())
}

fn classify_error(err: wasmtime::Error, time_limit: Duration) -> ExecError {
    if let Some(exceeded) = err.downcast_ref::<QuotaExceeded>() {
        return ExecError::ResourceExceeded(exceeded.0.clone());
    }

    if let Some(trap) = err.downcast_ref::<Trap>() {
        return match trap {
            Trap::Interrupt => ExecError::Timeout(time_limit),
            Trap::IntegerDivisionByZero => ExecError::Runtime("division by zero".to_string()),
            Trap::IntegerOverflow => ExecError::Runtime("integer overflow".to_string()),
            Trap::UnreachableCodeReached => {
                ExecError::Runtime("unreachable code reached".to_string())
            }
            Trap::MemoryOutOfBounds => {
                ExecError::Runtime("out of bounds memory access".to_string())
            }
            Trap::StackOverflow => ExecError::ResourceExceeded("stack overflow".to_string()),
            other => ExecError::Runtime(other.to_string()),
        };
    }

    if let Some(failure) = err.downcast_ref::<GuestFailure>() {
        return ExecError::Runtime(failure.0.clone());
    }

    ExecError::Runtime(format!("{:#}", err))
}

/// Interrupts the guest once the time limit passes.
///
/// The watchdog thread waits on a channel for the limit; disarming drops the
/// sender, which wakes the thread before the limit expires. When the limit
/// expires first, the engine epoch is bumped and the running guest traps at its
/// next loop header or call.
struct Watchdog {
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<bool>>,
}

impl Watchdog {
    fn arm(engine: Engine, limit: Duration) -> Result<Self, ExecError> {
        let (cancel, expiry) = crossbeam_channel::bounded::<()>(0);
        let handle = std::thread::Builder::new()
            .name("mdlive-watchdog".to_string())
            .spawn(move || match expiry.recv_timeout(limit) {
                Err(RecvTimeoutError::Timeout) => {
                    engine.increment_epoch();
                    true
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => false,
            })
            .map_err(|e| ExecError::Runtime(format!("failed to start watchdog: {}", e)))?;

        Ok(Self {
            cancel: Some(cancel),
            handle: Some(handle),
        })
    }

    /// Stops the watchdog and reports whether the limit had expired.
    fn disarm(mut self) -> bool {
        self.stop()
    }

    fn stop(&mut self) -> bool {
        self.cancel.take();
        self.handle
            .take()
            .map(|handle| handle.join().unwrap_or(false))
            .unwrap_or(false)
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::diagnostics::{Message, MessageKind, with_collection};
    use crate::options::CapabilitySet;

    const PRINT_OK: &str = r#"
(module
  (import "host" "print" (func $print (param i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "<b>ok</b>\n")
  (func (export "run") (call $print (i32.const 0) (i32.const 10))))
"#;

    const LOOP_FOREVER: &str = r#"
(module
  (func (export "run") (loop $spin (br $spin))))
"#;

    const DIVIDE_BY_ZERO: &str = r#"
(module
  (func (export "run") (drop (i32.div_s (i32.const 1) (i32.const 0)))))
"#;

    const WARN_TWICE: &str = r#"
(module
  (import "host" "warn" (func $warn (param i32 i32)))
  (import "host" "error" (func $error (param i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "first")
  (data (i32.const 16) "second")
  (func (export "run")
    (call $warn (i32.const 0) (i32.const 5))
    (call $error (i32.const 16) (i32.const 6))))
"#;

    fn context(options: &EvalOptions) -> WasmContext {
        WasmRuntime.create_context(options).unwrap()
    }

    fn unit(ctx: &WasmContext, index: usize) -> UnitId {
        UnitId::new(ctx.id(), index)
    }

    #[test]
    fn test_print_is_captured() {
        let options = EvalOptions::default();
        let mut ctx = context(&options);
        let u = unit(&ctx, 0);

        assert_eq!(ctx.run(u, PRINT_OK, &options).unwrap(), "<b>ok</b>\n");
    }

    #[test]
    fn test_module_without_entry_point_is_silent() {
        let options = EvalOptions::default();
        let mut ctx = context(&options);
        let u = unit(&ctx, 0);

        assert_eq!(ctx.run(u, "(module)", &options).unwrap(), "");
    }

    #[test]
    fn test_infinite_loop_times_out() {
        let options = EvalOptions::new(Duration::from_millis(100)).unwrap();
        let mut ctx = context(&options);
        let u = unit(&ctx, 0);

        assert_eq!(
            ctx.run(u, LOOP_FOREVER, &options),
            Err(ExecError::Timeout(Duration::from_millis(100)))
        );
    }

    #[test]
    fn test_context_usable_after_timeout() {
        let options = EvalOptions::new(Duration::from_millis(100)).unwrap();
        let mut ctx = context(&options);
        let first = unit(&ctx, 0);
        let second = unit(&ctx, 1);

        assert!(ctx.run(first, LOOP_FOREVER, &options).is_err());
        assert_eq!(ctx.run(second, PRINT_OK, &options).unwrap(), "<b>ok</b>\n");
    }

    #[test]
    fn test_division_by_zero() {
        let options = EvalOptions::default();
        let mut ctx = context(&options);
        let u = unit(&ctx, 0);

        assert_eq!(
            ctx.run(u, DIVIDE_BY_ZERO, &options),
            Err(ExecError::Runtime("division by zero".to_string()))
        );
    }

    #[test]
    fn test_fail_reports_guest_message() {
        let code = r#"
(module
  (import "host" "print" (func $print (param i32 i32)))
  (import "host" "fail" (func $fail (param i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "partial")
  (data (i32.const 16) "bad input")
  (func (export "run")
    (call $print (i32.const 0) (i32.const 7))
    (call $fail (i32.const 16) (i32.const 9))))
"#;
        let options = EvalOptions::default();
        let mut ctx = context(&options);
        let u = unit(&ctx, 0);

        assert_eq!(
            ctx.run(u, code, &options),
            Err(ExecError::Runtime("bad input".to_string()))
        );
    }

    #[test]
    fn test_output_does_not_leak_into_next_fragment() {
        let failing = r#"
(module
  (import "host" "print" (func $print (param i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "partial")
  (func (export "run")
    (call $print (i32.const 0) (i32.const 7))
    unreachable))
"#;
        let options = EvalOptions::default();
        let mut ctx = context(&options);
        let first = unit(&ctx, 0);
        let second = unit(&ctx, 1);

        assert_eq!(
            ctx.run(first, failing, &options),
            Err(ExecError::Runtime("unreachable code reached".to_string()))
        );
        assert_eq!(ctx.run(second, "(module)", &options).unwrap(), "");
    }

    #[test]
    fn test_diagnostics_reach_the_collector() {
        let options = EvalOptions::default();
        let mut ctx = context(&options);
        let u = unit(&ctx, 0);

        let (result, messages) = with_collection(|| ctx.run(u, WARN_TWICE, &options));

        assert!(result.is_ok());
        assert_eq!(
            messages,
            vec![
                Message::new(MessageKind::Warning, "first"),
                Message::new(MessageKind::Error, "second"),
            ]
        );
    }

    #[rstest]
    #[case::wasi(
        r#"(module (import "wasi_snapshot_preview1" "fd_write" (func (param i32 i32 i32 i32) (result i32))))"#,
        "import \"wasi_snapshot_preview1\" \"fd_write\" is not granted"
    )]
    #[case::env(
        r#"(module (import "env" "abort" (func)))"#,
        "import \"env\" \"abort\" is not granted"
    )]
    fn test_ungranted_imports_are_rejected(#[case] code: &str, #[case] expected: &str) {
        let options = EvalOptions::default();
        let mut ctx = context(&options);
        let u = unit(&ctx, 0);

        assert_eq!(
            ctx.run(u, code, &options),
            Err(ExecError::Compile(expected.to_string()))
        );
    }

    #[test]
    fn test_host_module_can_be_withheld() {
        let options = EvalOptions::default().with_capabilities(CapabilitySet::none());
        let mut ctx = context(&options);
        let u = unit(&ctx, 0);

        assert!(matches!(
            ctx.run(u, PRINT_OK, &options),
            Err(ExecError::Compile(_))
        ));
    }

    #[test]
    fn test_invalid_source_is_compile_error() {
        let options = EvalOptions::default();
        let mut ctx = context(&options);
        let u = unit(&ctx, 0);

        assert!(matches!(
            ctx.run(u, "this is not wasm", &options),
            Err(ExecError::Compile(_))
        ));
    }

    const PAGE: usize = 65536;

    fn quota_options(pages: usize) -> EvalOptions {
        EvalOptions::default()
            .with_memory_limit(pages * PAGE)
            .unwrap()
    }

    #[rstest]
    #[case::initial_memory("(module (memory 16))")]
    #[case::grow(
        r#"(module (memory 1) (func (export "run") (drop (memory.grow (i32.const 64)))))"#
    )]
    #[case::several_memories("(module (memory 2) (memory 2) (memory 2) (memory 2))")]
    #[case::table("(module (table 10000000 funcref))")]
    fn test_memory_quota_is_enforced(#[case] code: &str) {
        let options = quota_options(2);
        let mut ctx = context(&options);
        let u = unit(&ctx, 0);

        assert!(matches!(
            ctx.run(u, code, &options),
            Err(ExecError::ResourceExceeded(_))
        ));
    }

    #[test]
    fn test_quota_spans_all_fragments_of_a_context() {
        let code = r#"(module (memory (export "m") 1))"#;
        let options = quota_options(3);
        let mut ctx = context(&options);

        for index in 0..3 {
            let u = unit(&ctx, index);
            assert_eq!(ctx.run(u, code, &options).unwrap(), "");
        }

        let u = unit(&ctx, 3);
        assert!(matches!(
            ctx.run(u, code, &options),
            Err(ExecError::ResourceExceeded(_))
        ));
    }

    #[test]
    fn test_output_is_charged_against_the_quota() {
        let flood = r#"
(module
  (import "host" "print" (func $print (param i32 i32)))
  (memory (export "memory") 1)
  (func (export "run")
    (loop $again
      (call $print (i32.const 0) (i32.const 65536))
      (br $again))))
"#;
        let options = quota_options(3);
        let mut ctx = context(&options);
        let first = unit(&ctx, 0);
        let second = unit(&ctx, 1);

        assert!(matches!(
            ctx.run(first, flood, &options),
            Err(ExecError::ResourceExceeded(_))
        ));
        assert_eq!(ctx.run(second, PRINT_OK, &options).unwrap(), "<b>ok</b>\n");
    }

    #[test]
    fn test_later_fragments_see_earlier_exports() {
        let define = r#"
(module
  (import "host" "print" (func $print (param i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "hello")
  (func (export "greet") (call $print (i32.const 0) (i32.const 5))))
"#;
        let use_it = r#"
(module
  (import "doc" "greet" (func $greet))
  (func (export "run") (call $greet)))
"#;
        let options = EvalOptions::default();
        let mut ctx = context(&options);
        let first = unit(&ctx, 0);
        let second = unit(&ctx, 1);

        assert_eq!(ctx.run(first, define, &options).unwrap(), "");
        assert_eq!(ctx.run(second, use_it, &options).unwrap(), "hello");
    }

    #[test]
    fn test_contexts_do_not_share_definitions() {
        let define = r#"(module (func (export "helper")))"#;
        let use_it = r#"(module (import "doc" "helper" (func)))"#;
        let options = EvalOptions::default();

        let mut first = context(&options);
        let u = unit(&first, 0);
        assert!(first.run(u, define, &options).is_ok());

        let mut second = context(&options);
        let u = unit(&second, 0);
        assert!(matches!(
            second.run(u, use_it, &options),
            Err(ExecError::Runtime(_))
        ));
    }
}
