//! # State Module
//!
//! In-memory state shared by engine operations.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    State Architecture                                   │
//! │                                                                         │
//! │  ┌──────────────────┐  ┌──────────────────┐  ┌──────────────────────┐  │
//! │  │  SessionState    │  │ PaymentConfirm-  │  │     EventBus         │  │
//! │  │                  │  │ ationGate        │  │                      │  │
//! │  │  Arc<Mutex<      │  │  sale_id →       │  │  broadcast::Sender   │  │
//! │  │   CartSession-   │  │   oneshot pair   │  │   <Invalidation>     │  │
//! │  │   Manager>>      │  │                  │  │                      │  │
//! │  └──────────────────┘  └──────────────────┘  └──────────────────────┘  │
//! │                                                                         │
//! │  THREAD SAFETY:                                                        │
//! │  • SessionState: std Mutex, never held across an .await                │
//! │  • Gate: std Mutex around the pending maps                             │
//! │  • EventBus: broadcast channel, lock-free for senders                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod session;

pub use session::SessionState;
