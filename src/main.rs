use std::os::unix::io::RawFd;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use atophttpd::{http, AtopHttpd, AtopHttpdError, Config, Result};
use atophttpd_conn::{ConnRegistry, TcpConnType, TlsConnType};

fn main() {
    let config = Config::parse();
    init_logging(config.debug);

    if config.daemon {
        daemonize();
    }

    if let Err(e) = run(config) {
        error!(error = %e, "atophttpd exited with an error");
        std::process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Detaches from the controlling terminal: `fork`, parent exits;
/// child calls `setsid`, changes directory to `/`, and redirects the
/// standard streams to `/dev/null` -- the conventional double-step
/// daemonization the original's `-d` flag performed via `daemon(3)`.
fn daemonize() {
    use nix::unistd::{chdir, close, fork, setsid, ForkResult};

    match unsafe { fork() } {
        Ok(ForkResult::Parent { .. }) => std::process::exit(0),
        Ok(ForkResult::Child) => {}
        Err(e) => {
            eprintln!("fork failed: {e}");
            std::process::exit(1);
        }
    }

    let _ = setsid();
    let _ = chdir("/");

    for fd in [0, 1, 2] {
        let _ = close(fd as RawFd);
    }
    let devnull = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/null");
    if let Ok(f) = devnull {
        use std::os::unix::io::AsRawFd;
        let fd = f.as_raw_fd();
        unsafe {
            libc::dup2(fd, 0);
            libc::dup2(fd, 1);
            libc::dup2(fd, 2);
        }
        std::mem::forget(f);
    }
}

fn run(config: Config) -> Result<()> {
    let mut registry = ConnRegistry::new();
    registry
        .register(Box::new(TcpConnType))
        .map_err(AtopHttpdError::Conn)?;

    let has_tls = config.tls_port.is_some();
    if has_tls {
        registry
            .register(Box::new(TlsConnType::default()))
            .map_err(AtopHttpdError::Conn)?;
        let tls_config = config.tls_config().ok_or(AtopHttpdError::TlsNotConfigured)?;
        registry
            .get("tls")
            .map_err(AtopHttpdError::Conn)?
            .configure(&tls_config)
            .map_err(AtopHttpdError::Conn)?;
    }

    let tcp = registry.get("tcp").map_err(AtopHttpdError::Conn)?;
    let plain_fd = tcp.conn_create().map_err(AtopHttpdError::Conn)?;
    tcp.listen(plain_fd, &config.addr, config.port)
        .map_err(AtopHttpdError::Conn)?;
    info!(addr = %config.addr, port = config.port, "listening (plaintext)");

    let tls_fd = match config.tls_port {
        Some(port) => {
            let tls = registry.get("tls").map_err(AtopHttpdError::Conn)?;
            let fd = tls.conn_create().map_err(AtopHttpdError::Conn)?;
            tls.listen(fd, &config.tls_addr, port)
                .map_err(AtopHttpdError::Conn)?;
            info!(addr = %config.tls_addr, port = port, "listening (tls)");
            Some(fd)
        }
        None => None,
    };

    let mut ctx = AtopHttpd::new(config.path.clone(), config.hide_cmdline);
    ctx.engine.parse_all().map_err(|e| {
        error!(error = %e, "initial index scan failed");
        AtopHttpdError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
    })?;

    accept_loop(&mut ctx, &registry, plain_fd, tls_fd);
    Ok(())
}

/// The single-threaded cooperative event loop: waits on a readiness
/// primitive for either listener, accepts exactly one client, and
/// drives it to completion before returning to `poll` (SPEC_FULL.md
/// §4.6, §5). A 1-second timeout on the wait doubles as the interval
/// at which a stalled accept still lets the periodic index refresh in
/// `http::drive`'s dispatch path run.
fn accept_loop(ctx: &mut AtopHttpd, registry: &ConnRegistry, plain_fd: RawFd, tls_fd: Option<RawFd>) {
    use nix::poll::{poll, PollFd, PollFlags};
    use std::os::fd::BorrowedFd;

    let tcp = registry.get("tcp").expect("tcp always registered");
    let tls = tls_fd.map(|_| registry.get("tls").expect("tls registered when tls_fd is Some"));

    loop {
        let plain_borrow: BorrowedFd = unsafe { BorrowedFd::borrow_raw(plain_fd) };
        let tls_borrow: Option<BorrowedFd> =
            tls_fd.map(|fd| unsafe { BorrowedFd::borrow_raw(fd) });

        let mut fds = vec![PollFd::new(&plain_borrow, PollFlags::POLLIN)];
        if let Some(ref tb) = tls_borrow {
            fds.push(PollFd::new(tb, PollFlags::POLLIN));
        }

        match poll(&mut fds, 1000i32) {
            Ok(n) if n > 0 => {
                if fds[0].revents().is_some_and(|r| r.contains(PollFlags::POLLIN)) {
                    match tcp.accept(plain_fd) {
                        Ok(conn) => http::drive(ctx, conn),
                        Err(e) => error!(error = %e, "accept failed on plaintext listener"),
                    }
                }
                if let (Some(tls), Some(tfd)) = (tls, tls_fd) {
                    if fds.len() > 1 && fds[1].revents().is_some_and(|r| r.contains(PollFlags::POLLIN)) {
                        match tls.accept(tfd) {
                            Ok(conn) => http::drive(ctx, conn),
                            Err(e) => error!(error = %e, "accept failed on tls listener"),
                        }
                    }
                }
            }
            Ok(_) => {
                // Timeout: nothing ready, loop back around.
            }
            Err(e) => {
                error!(error = %e, "poll failed");
                std::thread::sleep(Duration::from_millis(100));
            }
        }
    }
}
