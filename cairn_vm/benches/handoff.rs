//! Breakpoint handoff benchmarks.
//!
//! # Benchmark Categories
//!
//! 1. **Channel**: send/receive across two threads
//! 2. **Breakpoint Cycle**: suspend, handle and resume one task
//! 3. **Interpreter**: the fixture with no breakpoint, for a baseline

use cairn_compiler::FunctionBuilder;
use cairn_core::Value;
use cairn_vm::debug::{Channel, Listener};
use cairn_vm::samples::ContextSpecs;
use cairn_vm::{Module, Vm, VmConfig};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use std::sync::Arc;
use std::thread;

// =============================================================================
// Channel
// =============================================================================

fn bench_channel(c: &mut Criterion) {
    let mut group = c.benchmark_group("channel");

    group.bench_function("same_thread", |b| {
        let chan = Channel::new();
        b.iter(|| {
            chan.send(black_box(1_u64)).unwrap();
            black_box(chan.receive().unwrap())
        });
    });

    group.bench_function("ping_pong", |b| {
        let ping: Channel<u64> = Channel::new();
        let pong: Channel<u64> = Channel::new();
        let (rx, tx) = (ping.clone(), pong.clone());
        let echo = thread::spawn(move || {
            while let Ok(v) = rx.receive() {
                if tx.send(v).is_err() {
                    break;
                }
            }
        });

        b.iter(|| {
            ping.send(black_box(7)).unwrap();
            black_box(pong.receive().unwrap())
        });

        ping.close();
        let _ = echo.join();
    });

    group.finish();
}

// =============================================================================
// Breakpoint Cycle
// =============================================================================

fn bench_breakpoint_cycle(c: &mut Criterion) {
    let vm = Vm::isolated(VmConfig::default());
    let listener = Listener::new(Arc::clone(vm.debug_hub()));
    listener.register().unwrap();

    let module = Module::new("Bench");
    let mut builder = FunctionBuilder::new("stop");
    let r = builder.alloc_register();
    builder.emit_yield_debugger();
    builder.emit_load_int(r, 1);
    builder.emit_return(r);
    let function = module.define_function(builder.finish().unwrap());

    c.bench_function("breakpoint_cycle", |b| {
        b.iter(|| {
            let waiter = listener.resume_next().unwrap();
            let result = vm.call(Arc::clone(&function), &[]).unwrap();
            waiter.join().unwrap();
            black_box(result)
        });
    });
}

// =============================================================================
// Interpreter Baseline
// =============================================================================

fn bench_interpreter(c: &mut Criterion) {
    let vm = Vm::isolated(VmConfig::default());
    let specs = ContextSpecs::build().unwrap();
    let block = specs.function("ret_7_block").unwrap();

    c.bench_function("call_block", |b| {
        b.iter(|| black_box(vm.call(Arc::clone(&block), &[Value::int(3)]).unwrap()));
    });
}

criterion_group!(
    handoff_benches,
    bench_channel,
    bench_breakpoint_cycle,
    bench_interpreter
);

criterion_main!(handoff_benches);
