use std::io;
use std::os::fd::RawFd;
use std::ptr;
use std::time::Duration;

use crate::operation::Operation;
use crate::poll::{MAX_EVENTS, PollEvent};
use crate::socket::Socket;

/// kqueue-backed poller. Level-triggered (no `EV_CLEAR`).
pub struct Poller {
    kq: RawFd,
    raw: [libc::kevent; MAX_EVENTS],
}

impl Poller {
    pub fn new() -> io::Result<Poller> {
        let kq = unsafe { libc::kqueue() };
        if kq < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Poller {
            kq,
            raw: unsafe { std::mem::zeroed() },
        })
    }

    fn change(&mut self, sock: Socket, filter: i16, flags: u16) -> io::Result<()> {
        let ev = libc::kevent {
            ident: sock.id as usize,
            filter,
            flags,
            fflags: 0,
            data: 0,
            udata: ptr::null_mut(),
        };
        let ret = unsafe { libc::kevent(self.kq, &ev, 1, ptr::null_mut(), 0, ptr::null()) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Brings the two filters in line with `interest`. A delete of a filter
    /// that was never added reports ENOENT, which is not an error here.
    fn set_filters(&mut self, sock: Socket, interest: Operation) -> io::Result<()> {
        for (op, filter) in [
            (Operation::READ, libc::EVFILT_READ),
            (Operation::WRITE, libc::EVFILT_WRITE),
        ] {
            if interest.contains(op) {
                self.change(sock, filter, libc::EV_ADD | libc::EV_ENABLE)?;
            } else {
                match self.change(sock, filter, libc::EV_DELETE) {
                    Ok(()) => {}
                    Err(e) if e.raw_os_error() == Some(libc::ENOENT) => {}
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(())
    }

    pub fn register(&mut self, sock: Socket, interest: Operation) -> io::Result<()> {
        self.set_filters(sock, interest)
    }

    pub fn modify(&mut self, sock: Socket, interest: Operation) -> io::Result<()> {
        self.set_filters(sock, interest)
    }

    pub fn deregister(&mut self, sock: Socket) -> io::Result<()> {
        self.set_filters(sock, Operation::NONE)
    }

    /// Waits for readiness, filling `events`. `None` blocks indefinitely.
    /// Returns the number of records; an interrupted wait reports zero.
    pub fn wait(
        &mut self,
        events: &mut Vec<PollEvent>,
        timeout: Option<Duration>,
    ) -> io::Result<usize> {
        events.clear();

        let ts;
        let ts_ptr = match timeout {
            Some(d) => {
                ts = libc::timespec {
                    tv_sec: d.as_secs() as libc::time_t,
                    tv_nsec: d.subsec_nanos() as libc::c_long,
                };
                &ts as *const libc::timespec
            }
            None => ptr::null(),
        };

        let n = unsafe {
            libc::kevent(
                self.kq,
                ptr::null(),
                0,
                self.raw.as_mut_ptr(),
                MAX_EVENTS as libc::c_int,
                ts_ptr,
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(err);
        }

        // kqueue reports one record per filter; EOF stays on the read path
        // so pending bytes are drained before read() observes it.
        for ev in &self.raw[..n as usize] {
            events.push(PollEvent {
                sock: Socket::new(ev.ident as RawFd),
                readable: ev.filter == libc::EVFILT_READ,
                writable: ev.filter == libc::EVFILT_WRITE,
                erroneous: ev.flags & libc::EV_ERROR != 0,
            });
        }
        Ok(events.len())
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.kq);
        }
    }
}
