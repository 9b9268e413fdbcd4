//! Networking layer on top of the event loop.
//!
//! The design keeps the callback model of the loop all the way up: no
//! async/await, no futures. A [`tcp::Tcp`] endpoint registers internal
//! handlers with the loop; user code only sees closures and
//! [`tcp::Connection`] handles.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      User application                       │
//! │     listen(port, on_connect)     write(data, on_complete)   │
//! └────────────┬──────────────────────────┬─────────────────────┘
//!              │ register                 │ callbacks
//!              ▼                          │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        EventLoop                            │
//! │   ┌──────────┐      ┌───────────┐      ┌──────────────┐     │
//! │   │ Reactor  │────▶│ Handlers  │────▶│ Thread pool  │     │
//! │   │ (poll)   │      │ registry  │      │              │     │
//! │   └──────────┘      └───────────┘      └──────────────┘     │
//! └────────────┬────────────────────────────────────────────────┘
//!              │ OS readiness
//!              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │             Operating system (epoll/kqueue/IOCP)            │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod errors;
pub mod tcp;
