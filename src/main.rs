/*!
 * sigwatch - Signal Context Demo
 *
 * Blocks the named signals, exposes them through a signal context on the
 * native event queue and logs every signal consumed until SIGINT or
 * SIGTERM arrives.
 *
 * Usage: sigwatch [SIGNAL ...]
 */

use miette::IntoDiagnostic;
use signalfd_shim::{
    init_tracing, EventQueue, PlatformQueue, SignalContext, TraceConfig, WatchConfig,
};
use tracing::{debug, info};

fn main() -> miette::Result<()> {
    init_tracing(&TraceConfig::from_env());

    let config = WatchConfig::from_args(std::env::args().skip(1))?;
    config.signals.thread_block()?;

    let queue = PlatformQueue::open()?;
    let ctx = SignalContext::init(&queue, &config.signals)?;
    let exit_on = config.effective_exit_on();

    info!(
        pid = std::process::id(),
        signals = ?config.signals,
        strategy = ctx.strategy(),
        "sigwatch ready"
    );

    'watch: loop {
        let ready = queue.wait(Some(config.timeout))?;
        if !ready.contains(&ctx.token()) {
            // Heartbeat: resync in case an arrival had no observer wakeup
            let readable = ctx.poll();
            debug!(readable, "idle");
            continue;
        }

        loop {
            match ctx.read() {
                Ok(signal) => {
                    info!(signal = %signal, signo = signal.raw(), "signal consumed");
                    if exit_on.contains(signal) {
                        break 'watch;
                    }
                }
                Err(err) if err.is_would_block() => break,
                Err(err) => return Err(err.into()),
            }
        }

        // Re-arm for queues that hand out user events edge-style
        ctx.poll();
    }

    let stats = ctx.stats();
    println!("{}", serde_json::to_string_pretty(&stats).into_diagnostic()?);
    ctx.terminate()?;
    Ok(())
}
