use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

use crate::operation::Operation;
use crate::poll::{MAX_EVENTS, PollEvent};
use crate::socket::Socket;

fn interest_bits(interest: Operation) -> u32 {
    let mut events = 0;
    if interest.contains(Operation::READ) {
        events |= libc::EPOLLIN as u32;
    }
    if interest.contains(Operation::WRITE) {
        events |= libc::EPOLLOUT as u32;
    }
    events
}

/// epoll-backed poller. Level-triggered.
pub struct Poller {
    epfd: RawFd,
    raw: [libc::epoll_event; MAX_EVENTS],
}

impl Poller {
    pub fn new() -> io::Result<Poller> {
        let epfd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if epfd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Poller {
            epfd,
            raw: unsafe { std::mem::zeroed() },
        })
    }

    fn ctl(&mut self, op: libc::c_int, sock: Socket, interest: Operation) -> io::Result<()> {
        let mut ev = libc::epoll_event {
            events: interest_bits(interest),
            u64: sock.id as u64,
        };
        let ret = unsafe { libc::epoll_ctl(self.epfd, op, sock.id, &mut ev) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub fn register(&mut self, sock: Socket, interest: Operation) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_ADD, sock, interest)
    }

    pub fn modify(&mut self, sock: Socket, interest: Operation) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_MOD, sock, interest)
    }

    pub fn deregister(&mut self, sock: Socket) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_DEL, sock, Operation::NONE)
    }

    /// Waits for readiness, filling `events`. `None` blocks indefinitely.
    /// Returns the number of records; an interrupted wait reports zero.
    pub fn wait(
        &mut self,
        events: &mut Vec<PollEvent>,
        timeout: Option<Duration>,
    ) -> io::Result<usize> {
        events.clear();

        let timeout_ms = match timeout {
            None => -1,
            Some(d) => {
                // Round up so a sub-millisecond deadline still sleeps.
                let mut ms = d.as_millis();
                if d.subsec_nanos() % 1_000_000 != 0 {
                    ms += 1;
                }
                ms.min(i32::MAX as u128) as libc::c_int
            }
        };

        let n = unsafe {
            libc::epoll_wait(
                self.epfd,
                self.raw.as_mut_ptr(),
                MAX_EVENTS as libc::c_int,
                timeout_ms,
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(err);
        }

        for ev in &self.raw[..n as usize] {
            events.push(PollEvent {
                sock: Socket::new(ev.u64 as RawFd),
                readable: ev.events & libc::EPOLLIN as u32 != 0,
                writable: ev.events & libc::EPOLLOUT as u32 != 0,
                erroneous: ev.events & (libc::EPOLLERR | libc::EPOLLHUP) as u32 != 0,
            });
        }
        Ok(events.len())
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epfd);
        }
    }
}
