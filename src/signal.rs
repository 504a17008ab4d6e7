//! `SIGHUP` to summary request forwarding.
//!
//! Nothing runs in a signal handler: the signal is blocked and a dedicated thread picks it up
//! with `sigwait`, then queues a [`SummaryRequest`] for the summarizer.

use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::channel::BoundedChannel;
use crate::ledger::SummaryRequest;

/// Blocks `SIGHUP` for the calling thread and for every thread it spawns afterwards, then starts
/// the thread that turns each `SIGHUP` into a summary request.
///
/// Must be called before the other broker threads are started, otherwise they may still
/// receive the signal and terminate the process.
#[cfg(unix)]
pub(crate) fn forward_hangups(
    requests: Arc<BoundedChannel<SummaryRequest>>,
) -> io::Result<Option<JoinHandle<()>>> {
    use std::mem::MaybeUninit;
    use std::ptr;
    use std::thread;

    use tracing::{debug, error, warn};

    let mut set = MaybeUninit::<libc::sigset_t>::uninit();
    let set = unsafe {
        libc::sigemptyset(set.as_mut_ptr());
        libc::sigaddset(set.as_mut_ptr(), libc::SIGHUP);
        set.assume_init()
    };

    // returns the error number instead of setting errno
    let res = unsafe { libc::pthread_sigmask(libc::SIG_BLOCK, &set, ptr::null_mut()) };
    if res != 0 {
        return Err(io::Error::from_raw_os_error(res));
    }

    let handle = thread::Builder::new()
        .name("sighup".to_owned())
        .spawn(move || loop {
            let mut signal = 0;
            let res = unsafe { libc::sigwait(&set, &mut signal) };
            if res != 0 {
                error!("sigwait failed: {}", io::Error::from_raw_os_error(res));
                return;
            }
            debug!(signal, "hangup received");
            if let Err(full) = requests.write(SummaryRequest) {
                warn!("{full}, summary request dropped");
            }
        })?;
    Ok(Some(handle))
}

#[cfg(not(unix))]
pub(crate) fn forward_hangups(
    _requests: Arc<BoundedChannel<SummaryRequest>>,
) -> io::Result<Option<JoinHandle<()>>> {
    tracing::warn!("no hangup signal on this platform, summaries must be requested directly");
    Ok(None)
}
