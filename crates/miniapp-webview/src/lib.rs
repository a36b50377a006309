//! Web-surface side of the mini-app runtime.
//!
//! - [`policy`]: which outbound navigations the page may make
//! - [`bridge`]: page -> host messages and exactly-once replies
//! - [`affordance`]: back/forward availability and navigation bar placement
//! - [`surface`]: the capability trait the web engine is driven through
//! - [`render_queue`]: hand-off of work onto the single rendering thread
//! - [`resources`]: bundle subresources served under a custom scheme

pub mod affordance;
pub mod bridge;
pub mod history;
pub mod policy;
pub mod render_queue;
pub mod resources;
pub mod surface;
#[cfg(feature = "wry")]
pub mod wry_surface;

pub use affordance::{
    AffordanceKind, AffordanceState, Capability, LayoutAnchor, NavigationAffordanceStateMachine,
    NavigationBarAttachment, NavigationDelegate, Transition,
};
pub use bridge::{
    BridgeMessage, BridgeMessageRouter, BridgeOutcome, BridgeResponder, Delivery, MessageHandler,
    BRIDGE_INIT_SCRIPT,
};
pub use history::NavigationHistory;
pub use policy::{
    CancelReason, ExternalOpener, NavigationPolicyGate, PolicyDecision, UnhandledExternalOpener,
};
pub use render_queue::{RenderQueue, SurfaceCommand};
pub use resources::{
    bundle_document_url, request_path, EntryDocument, Resource, ResourceLoader,
    ResourceResponder, SharedResourceLoader, BUNDLE_ORIGIN, BUNDLE_SCHEME,
};
pub use surface::{HistoryState, SurfaceEvent, WebSurface};
#[cfg(feature = "wry")]
pub use wry_surface::WrySurface;
