use std::ffi::{c_int, c_void, CStr};
use std::fmt;

use bitflags::bitflags;
use strum::{Display, EnumIter};

use super::HandleId;
use crate::native::params::{GraphicsAddress, GraphicsSubjectIdentity, TypedParam};
use crate::native::types::{
    AdmConnectPtr, ConnectPtr, DomainPtr, FromSubject, NetworkPtr, NodeDevicePtr, SecretPtr,
    StoragePoolPtr, StreamPtr, Subject,
};
use crate::{Result, VirtBridgeError};

/// Declares an enum over a native integer code. Codes the crate does not
/// know decode to `Unknown(code)`.
macro_rules! native_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident = $code:literal),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant,)*
            /// A code without a known meaning
            Unknown(i32),
        }

        impl From<i32> for $name {
            fn from(code: i32) -> Self {
                match code {
                    $($code => $name::$variant,)*
                    other => $name::Unknown(other),
                }
            }
        }

        impl $name {
            /// The native integer code
            pub fn code(&self) -> i32 {
                match self {
                    $($name::$variant => $code,)*
                    $name::Unknown(code) => *code,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $($name::$variant => f.write_str(stringify!($variant)),)*
                    $name::Unknown(code) => write!(f, "Unknown({})", code),
                }
            }
        }
    };
}

native_enum!(
    /// `virDomainEventType`
    DomainEventType {
        /// Defined
        Defined = 0,
        /// Undefined
        Undefined = 1,
        /// Started
        Started = 2,
        /// Suspended
        Suspended = 3,
        /// Resumed
        Resumed = 4,
        /// Stopped
        Stopped = 5,
        /// Shutdown
        Shutdown = 6,
        /// PMSuspended
        PmSuspended = 7,
        /// Crashed
        Crashed = 8,
    }
);

native_enum!(
    /// `virNetworkEventLifecycleType`
    NetworkEventType {
        /// Defined
        Defined = 0,
        /// Undefined
        Undefined = 1,
        /// Started
        Started = 2,
        /// Stopped
        Stopped = 3,
    }
);

native_enum!(
    /// `virStoragePoolEventLifecycleType`
    StoragePoolEventType {
        /// Defined
        Defined = 0,
        /// Undefined
        Undefined = 1,
        /// Started
        Started = 2,
        /// Stopped
        Stopped = 3,
        /// Created
        Created = 4,
        /// Deleted
        Deleted = 5,
    }
);

native_enum!(
    /// `virNodeDeviceEventLifecycleType`
    NodeDeviceEventType {
        /// Created
        Created = 0,
        /// Deleted
        Deleted = 1,
        /// Defined
        Defined = 2,
        /// Undefined
        Undefined = 3,
    }
);

native_enum!(
    /// `virSecretEventLifecycleType`
    SecretEventType {
        /// Defined
        Defined = 0,
        /// Undefined
        Undefined = 1,
    }
);

native_enum!(
    /// `virConnectCloseReason`
    ConnectCloseReason {
        /// Misc I/O error
        Error = 0,
        /// End-of-file from server
        Eof = 1,
        /// Keepalive timer triggered
        Keepalive = 2,
        /// Client requested it
        Client = 3,
    }
);

native_enum!(
    /// `virDomainMetadataType`
    MetadataType {
        /// Operate on the description
        Description = 0,
        /// Operate on the title
        Title = 1,
        /// Operate on an element with a namespace
        Element = 2,
    }
);

native_enum!(
    /// `virDomainEventWatchdogAction`
    WatchdogAction {
        /// No action, watchdog ignored
        None = 0,
        /// Guest CPUs are paused
        Pause = 1,
        /// Guest CPUs are reset
        Reset = 2,
        /// Guest is forcibly powered off
        Poweroff = 3,
        /// Guest is requested to gracefully shutdown
        Shutdown = 4,
        /// No action, a debug message logged
        Debug = 5,
        /// Inject a non-maskable interrupt into guest
        InjectNmi = 6,
    }
);

native_enum!(
    /// `virDomainEventIOErrorAction`
    IoErrorAction {
        /// No action, IO error ignored
        None = 0,
        /// Guest CPUs are paused
        Pause = 1,
        /// IO error reported to guest OS
        Report = 2,
    }
);

native_enum!(
    /// `virDomainBlockJobType`
    BlockJobType {
        /// Placeholder
        Unspecified = 0,
        /// Block pull
        Pull = 1,
        /// Block copy
        Copy = 2,
        /// Block commit
        Commit = 3,
        /// Active block commit
        ActiveCommit = 4,
        /// Backup
        Backup = 5,
    }
);

native_enum!(
    /// `virConnectDomainEventBlockJobStatus`
    BlockJobStatus {
        /// Completed
        Completed = 0,
        /// Failed
        Failed = 1,
        /// Canceled
        Canceled = 2,
        /// Ready
        Ready = 3,
    }
);

native_enum!(
    /// `virConnectDomainEventDiskChangeReason`
    DiskChangeReason {
        /// Old source was missing on start
        MissingOnStart = 0,
        /// Disk was dropped because its source was missing on start
        DroppedMissingOnStart = 1,
    }
);

native_enum!(
    /// `virDomainEventTrayChangeReason`
    TrayChangeReason {
        /// Tray opened
        Open = 0,
        /// Tray closed
        Close = 1,
    }
);

native_enum!(
    /// `virConnectDomainEventAgentLifecycleState`
    AgentLifecycleState {
        /// Agent connected
        Connected = 1,
        /// Agent disconnected
        Disconnected = 2,
    }
);

native_enum!(
    /// `virConnectDomainEventAgentLifecycleReason`
    AgentLifecycleReason {
        /// Unknown state change reason
        Unspecified = 0,
        /// State changed due to domain start
        DomainStarted = 1,
        /// Channel state changed
        Channel = 2,
    }
);

native_enum!(
    /// `virDomainMemoryFailureRecipientType`
    MemoryFailureRecipient {
        /// Memory failure affects the hypervisor
        Hypervisor = 0,
        /// Memory failure affects the guest
        Guest = 1,
    }
);

native_enum!(
    /// `virDomainMemoryFailureActionType`
    MemoryFailureAction {
        /// The failure could be ignored
        Ignore = 0,
        /// The failure was injected into the guest
        Inject = 1,
        /// The failure is fatal
        Fatal = 2,
        /// The failure caused a reset
        Reset = 3,
    }
);

native_enum!(
    /// `virDomainEventGraphicsPhase`
    GraphicsPhase {
        /// Initial socket connection established
        Connect = 0,
        /// Authentication and setup completed
        Initialize = 1,
        /// Final socket shutdown
        Disconnect = 2,
    }
);

native_enum!(
    /// `virDomainEventGraphicsAddressType`
    GraphicsAddressFamily {
        /// IPv4 address
        Ipv4 = 0,
        /// IPv6 address
        Ipv6 = 1,
        /// UNIX socket path
        Unix = 2,
    }
);

native_enum!(
    /// `virConnectCredentialType`
    CredentialType {
        /// Identity to act as
        Username = 1,
        /// Identify to authorize as
        Authname = 2,
        /// RFC 1766 languages, comma separated
        Language = 3,
        /// Client supplied a nonce
        Cnonce = 4,
        /// Passphrase secret
        Passphrase = 5,
        /// Challenge response
        EchoPrompt = 6,
        /// Challenge response
        NoEchoPrompt = 7,
        /// Authentication realm
        Realm = 8,
        /// Externally managed credential
        External = 9,
    }
);

bitflags! {
    /// `virDomainMemoryFailureFlags`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemoryFailureFlags: u32 {
        /// Whether the failure was detected with action required
        const ACTION_REQUIRED = 1 << 0;
        /// Whether the failure happened while handling a previous failure
        const RECURSIVE = 1 << 1;
    }
}

bitflags! {
    /// `virEventHandleType`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventHandleType: i32 {
        /// Readable
        const READABLE = 1 << 0;
        /// Writable
        const WRITABLE = 1 << 1;
        /// Error
        const ERROR = 1 << 2;
        /// Hang up
        const HANGUP = 1 << 3;
    }
}

bitflags! {
    /// `virStreamEventType`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StreamEventType: i32 {
        /// Readable
        const READABLE = 1 << 0;
        /// Writable
        const WRITABLE = 1 << 1;
        /// Error
        const ERROR = 1 << 2;
        /// Hang up
        const HANGUP = 1 << 3;
    }
}

bitflags! {
    /// `virConnectDomainQemuMonitorEventRegisterFlags`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct QemuMonitorEventFlags: u32 {
        /// Treat the event name as a POSIX extended regular expression
        const REGEX = 1 << 0;
        /// Match the event name case insensitively
        const NOCASE = 1 << 1;
    }
}

/// The object families that have their own register/deregister pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum EventFamily {
    /// Domain events
    Domain,
    /// Network events
    Network,
    /// Storage pool events
    StoragePool,
    /// Node device events
    NodeDevice,
    /// Secret events
    Secret,
    /// QEMU monitor events, from the QEMU library
    QemuMonitor,
}

impl EventFamily {
    /// The native registration entry point of the family
    pub fn register_symbol(&self) -> &'static str {
        match self {
            EventFamily::Domain => "virConnectDomainEventRegisterAny",
            EventFamily::Network => "virConnectNetworkEventRegisterAny",
            EventFamily::StoragePool => "virConnectStoragePoolEventRegisterAny",
            EventFamily::NodeDevice => "virConnectNodeDeviceEventRegisterAny",
            EventFamily::Secret => "virConnectSecretEventRegisterAny",
            EventFamily::QemuMonitor => "virConnectDomainQemuMonitorEventRegister",
        }
    }

    /// The native deregistration entry point of the family
    pub fn deregister_symbol(&self) -> &'static str {
        match self {
            EventFamily::Domain => "virConnectDomainEventDeregisterAny",
            EventFamily::Network => "virConnectNetworkEventDeregisterAny",
            EventFamily::StoragePool => "virConnectStoragePoolEventDeregisterAny",
            EventFamily::NodeDevice => "virConnectNodeDeviceEventDeregisterAny",
            EventFamily::Secret => "virConnectSecretEventDeregisterAny",
            EventFamily::QemuMonitor => "virConnectDomainQemuMonitorEventDeregister",
        }
    }

    fn subject(&self, raw: *mut c_void) -> Subject {
        match self {
            EventFamily::Domain | EventFamily::QemuMonitor => {
                Subject::Domain(DomainPtr::from_raw(raw))
            }
            EventFamily::Network => Subject::Network(NetworkPtr::from_raw(raw)),
            EventFamily::StoragePool => Subject::StoragePool(StoragePoolPtr::from_raw(raw)),
            EventFamily::NodeDevice => Subject::NodeDevice(NodeDevicePtr::from_raw(raw)),
            EventFamily::Secret => Subject::Secret(SecretPtr::from_raw(raw)),
        }
    }
}

/// Which decoding path applies to a registered callback.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum CallbackKind {
    DomainLifecycle,
    DomainReboot,
    DomainRtcChange,
    DomainWatchdog,
    DomainIoError,
    DomainGraphics,
    DomainIoErrorReason,
    DomainControlError,
    DomainBlockJob,
    DomainDiskChange,
    DomainTrayChange,
    DomainPmWakeup,
    DomainPmSuspend,
    DomainBalloonChange,
    DomainPmSuspendDisk,
    DomainDeviceRemoved,
    DomainBlockJob2,
    DomainTunable,
    DomainAgentLifecycle,
    DomainDeviceAdded,
    DomainMigrationIteration,
    DomainJobCompleted,
    DomainDeviceRemovalFailed,
    DomainMetadataChange,
    DomainBlockThreshold,
    DomainMemoryFailure,
    NetworkLifecycle,
    StoragePoolLifecycle,
    StoragePoolRefresh,
    NodeDeviceLifecycle,
    NodeDeviceUpdate,
    SecretLifecycle,
    SecretValueChanged,
    /// Connection closed, registered through `virConnectRegisterCloseCallback`
    ConnectClose,
    /// Event loop timer, registered through `virEventAddTimeout`
    Timeout,
    /// Event loop file handle watch, registered through `virEventAddHandle`
    HandleWatch,
    /// QEMU monitor event, registered through
    /// `virConnectDomainQemuMonitorEventRegister`
    QemuMonitor,
    /// Stream readiness, registered through `virStreamEventAddCallback`
    Stream,
    /// Admin connection closed, registered through
    /// `virAdmConnectRegisterCloseCallback`
    AdmConnectClose,
    /// Data or hole received by `virStreamRecvAll` and friends
    StreamSink,
    /// Data, hole or skip requested by `virStreamSendAll` and friends
    StreamSource,
    /// Credentials requested by `virConnectOpenAuth`
    ConnectAuth,
    /// An operation of an event loop installed with `virEventRegisterImpl`
    EventLoopImpl,
}

impl CallbackKind {
    /// The family and native event id used with `Register/DeregisterAny`.
    /// `None` for kinds registered through other entry points.
    pub fn event_id(&self) -> Option<(EventFamily, c_int)> {
        use CallbackKind::*;
        use EventFamily::*;
        let id = match self {
            DomainLifecycle => (Domain, 0),
            DomainReboot => (Domain, 1),
            DomainRtcChange => (Domain, 2),
            DomainWatchdog => (Domain, 3),
            DomainIoError => (Domain, 4),
            DomainGraphics => (Domain, 5),
            DomainIoErrorReason => (Domain, 6),
            DomainControlError => (Domain, 7),
            DomainBlockJob => (Domain, 8),
            DomainDiskChange => (Domain, 9),
            DomainTrayChange => (Domain, 10),
            DomainPmWakeup => (Domain, 11),
            DomainPmSuspend => (Domain, 12),
            DomainBalloonChange => (Domain, 13),
            DomainPmSuspendDisk => (Domain, 14),
            DomainDeviceRemoved => (Domain, 15),
            DomainBlockJob2 => (Domain, 16),
            DomainTunable => (Domain, 17),
            DomainAgentLifecycle => (Domain, 18),
            DomainDeviceAdded => (Domain, 19),
            DomainMigrationIteration => (Domain, 20),
            DomainJobCompleted => (Domain, 21),
            DomainDeviceRemovalFailed => (Domain, 22),
            DomainMetadataChange => (Domain, 23),
            DomainBlockThreshold => (Domain, 24),
            DomainMemoryFailure => (Domain, 25),
            NetworkLifecycle => (Network, 0),
            StoragePoolLifecycle => (StoragePool, 0),
            StoragePoolRefresh => (StoragePool, 1),
            NodeDeviceLifecycle => (NodeDevice, 0),
            NodeDeviceUpdate => (NodeDevice, 1),
            SecretLifecycle => (Secret, 0),
            SecretValueChanged => (Secret, 1),
            ConnectClose | Timeout | HandleWatch | CallbackKind::QemuMonitor | Stream | AdmConnectClose
            | StreamSink | StreamSource | ConnectAuth | EventLoopImpl => return None,
        };
        Some(id)
    }

    /// The family the kind is registered and deregistered through, if any
    pub fn family(&self) -> Option<EventFamily> {
        match self {
            CallbackKind::QemuMonitor => Some(EventFamily::QemuMonitor),
            other => other.event_id().map(|(family, _)| family),
        }
    }

    /// Whether the kind is invoked through [`super::invocation::Invocation`]
    /// and answers the native side, rather than being dispatched as an
    /// [`Event`].
    pub fn is_call(&self) -> bool {
        matches!(
            self,
            CallbackKind::StreamSink
                | CallbackKind::StreamSource
                | CallbackKind::ConnectAuth
                | CallbackKind::EventLoopImpl
        )
    }

    fn subject(&self, raw: *mut c_void) -> Subject {
        match self {
            CallbackKind::Stream => Subject::Stream(StreamPtr::from_raw(raw)),
            CallbackKind::AdmConnectClose => Subject::AdmConnect(AdmConnectPtr::from_raw(raw)),
            other => match other.family() {
                Some(family) => family.subject(raw),
                None => Subject::None,
            },
        }
    }
}

/// One argument as received by a trampoline, before decoding.
///
/// Native structs are copied by the trampoline and passed by reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawArg<'a> {
    /// A signed integer argument
    Int(i64),
    /// An unsigned integer argument
    UInt(u64),
    /// A string argument, `None` when the native side passed null
    Str(Option<&'a CStr>),
    /// A typed parameter array
    Params(&'a [TypedParam]),
    /// A graphics address, `None` when the native side passed null
    Address(Option<&'a GraphicsAddress>),
    /// The identities of a graphics subject
    Identities(&'a [GraphicsSubjectIdentity]),
}

/// Everything a trampoline received, except the opaque pointer.
#[derive(Debug, Clone, Copy)]
pub struct RawEvent<'a> {
    /// The connection the event came from, null for event loop callbacks
    pub conn: ConnectPtr,
    /// The raw subject pointer, null when there is none
    pub subject: *mut c_void,
    /// The remaining arguments in declaration order
    pub args: &'a [RawArg<'a>],
}

impl<'a> RawEvent<'a> {
    /// An event about `subject` on `conn`
    pub fn new(conn: ConnectPtr, subject: *mut c_void, args: &'a [RawArg<'a>]) -> Self {
        Self {
            conn,
            subject,
            args,
        }
    }
}

macro_rules! records {
    ($($(#[$meta:meta])* $name:ident { $($(#[$fmeta:meta])* $field:ident : $ty:ty),* $(,)? })*) => {
        $(
            $(#[$meta])*
            #[allow(missing_docs)]
            #[derive(Debug, Clone, PartialEq)]
            pub struct $name {
                $($(#[$fmeta])* pub $field: $ty,)*
            }
        )*
    };
}

records! {
    /// The domain changed lifecycle state
    DomainLifecycleEvent {
        event: DomainEventType,
        /// Meaning depends on `event`
        detail: i32,
    }
    /// The domain rebooted
    DomainRebootEvent {}
    /// The guest RTC changed
    DomainRtcChangeEvent {
        /// Seconds from UTC
        utc_offset: i64,
    }
    /// The watchdog fired
    DomainWatchdogEvent {
        action: WatchdogAction,
    }
    /// A disk hit an I/O error
    DomainIoErrorEvent {
        src_path: String,
        dev_alias: String,
        action: IoErrorAction,
    }
    /// A graphics client connected, authenticated or disconnected
    DomainGraphicsEvent {
        phase: GraphicsPhase,
        local: Option<GraphicsAddress>,
        remote: Option<GraphicsAddress>,
        auth_scheme: String,
        /// Identities of the client, empty before authentication
        subject: Vec<GraphicsSubjectIdentity>,
    }
    /// A disk hit an I/O error, with the reason
    DomainIoErrorReasonEvent {
        src_path: String,
        dev_alias: String,
        action: IoErrorAction,
        reason: String,
    }
    /// A control channel error occurred
    DomainControlErrorEvent {}
    /// A block job changed state, `disk` is the source path
    DomainBlockJobEvent {
        disk: String,
        job_type: BlockJobType,
        status: BlockJobStatus,
    }
    /// A block job changed state, `disk` is the target name
    DomainBlockJob2Event {
        disk: String,
        job_type: BlockJobType,
        status: BlockJobStatus,
    }
    /// Removable media changed
    DomainDiskChangeEvent {
        old_src_path: String,
        new_src_path: String,
        dev_alias: String,
        reason: DiskChangeReason,
    }
    /// A tray opened or closed
    DomainTrayChangeEvent {
        dev_alias: String,
        reason: TrayChangeReason,
    }
    /// The guest woke up
    DomainPmWakeupEvent {
        reason: i32,
    }
    /// The guest suspended to RAM
    DomainPmSuspendEvent {
        reason: i32,
    }
    /// The guest suspended to disk
    DomainPmSuspendDiskEvent {
        reason: i32,
    }
    /// The balloon size changed
    DomainBalloonChangeEvent {
        /// KiB
        actual: u64,
    }
    /// A device was removed
    DomainDeviceRemovedEvent {
        dev_alias: String,
    }
    /// Tunable values changed
    DomainTunableEvent {
        params: Vec<TypedParam>,
    }
    /// The guest agent connected or disconnected
    DomainAgentLifecycleEvent {
        state: AgentLifecycleState,
        reason: AgentLifecycleReason,
    }
    /// A device was added
    DomainDeviceAddedEvent {
        dev_alias: String,
    }
    /// A migration iteration started
    DomainMigrationIterationEvent {
        iteration: i32,
    }
    /// A job completed, with its final statistics
    DomainJobCompletedEvent {
        params: Vec<TypedParam>,
    }
    /// Device removal failed
    DomainDeviceRemovalFailedEvent {
        dev_alias: String,
    }
    /// Domain metadata changed
    DomainMetadataChangeEvent {
        metadata_type: MetadataType,
        ns_uri: String,
    }
    /// A block threshold was exceeded
    DomainBlockThresholdEvent {
        dev: String,
        path: String,
        threshold: u64,
        excess: u64,
    }
    /// A memory failure was reported
    DomainMemoryFailureEvent {
        recipient: MemoryFailureRecipient,
        action: MemoryFailureAction,
        flags: MemoryFailureFlags,
    }
    /// The network changed lifecycle state
    NetworkLifecycleEvent {
        event: NetworkEventType,
        detail: i32,
    }
    /// The storage pool changed lifecycle state
    StoragePoolLifecycleEvent {
        event: StoragePoolEventType,
        detail: i32,
    }
    /// The storage pool was refreshed
    StoragePoolRefreshEvent {}
    /// The node device changed lifecycle state
    NodeDeviceLifecycleEvent {
        event: NodeDeviceEventType,
        detail: i32,
    }
    /// The node device was updated
    NodeDeviceUpdateEvent {}
    /// The secret changed lifecycle state
    SecretLifecycleEvent {
        event: SecretEventType,
        detail: i32,
    }
    /// The secret value changed
    SecretValueChangedEvent {}
    /// The connection closed
    ConnectCloseEvent {
        reason: ConnectCloseReason,
    }
    /// An event loop timer fired
    TimeoutEvent {
        timer: i32,
    }
    /// An event loop file handle is ready
    HandleWatchEvent {
        watch: i32,
        fd: i32,
        events: EventHandleType,
    }
    /// The QEMU monitor emitted an event
    QemuMonitorEvent {
        /// Name of the monitor event
        event: String,
        seconds: i64,
        micros: u32,
        /// JSON details, empty when the event has none
        details: String,
    }
    /// A stream became ready
    StreamEvent {
        events: StreamEventType,
    }
    /// The admin connection closed
    AdmConnectCloseEvent {
        reason: ConnectCloseReason,
    }
}

/// A decoded event, one variant per [`CallbackKind`].
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    DomainLifecycle(DomainLifecycleEvent),
    DomainReboot(DomainRebootEvent),
    DomainRtcChange(DomainRtcChangeEvent),
    DomainWatchdog(DomainWatchdogEvent),
    DomainIoError(DomainIoErrorEvent),
    DomainGraphics(DomainGraphicsEvent),
    DomainIoErrorReason(DomainIoErrorReasonEvent),
    DomainControlError(DomainControlErrorEvent),
    DomainBlockJob(DomainBlockJobEvent),
    DomainDiskChange(DomainDiskChangeEvent),
    DomainTrayChange(DomainTrayChangeEvent),
    DomainPmWakeup(DomainPmWakeupEvent),
    DomainPmSuspend(DomainPmSuspendEvent),
    DomainBalloonChange(DomainBalloonChangeEvent),
    DomainPmSuspendDisk(DomainPmSuspendDiskEvent),
    DomainDeviceRemoved(DomainDeviceRemovedEvent),
    DomainBlockJob2(DomainBlockJob2Event),
    DomainTunable(DomainTunableEvent),
    DomainAgentLifecycle(DomainAgentLifecycleEvent),
    DomainDeviceAdded(DomainDeviceAddedEvent),
    DomainMigrationIteration(DomainMigrationIterationEvent),
    DomainJobCompleted(DomainJobCompletedEvent),
    DomainDeviceRemovalFailed(DomainDeviceRemovalFailedEvent),
    DomainMetadataChange(DomainMetadataChangeEvent),
    DomainBlockThreshold(DomainBlockThresholdEvent),
    DomainMemoryFailure(DomainMemoryFailureEvent),
    NetworkLifecycle(NetworkLifecycleEvent),
    StoragePoolLifecycle(StoragePoolLifecycleEvent),
    StoragePoolRefresh(StoragePoolRefreshEvent),
    NodeDeviceLifecycle(NodeDeviceLifecycleEvent),
    NodeDeviceUpdate(NodeDeviceUpdateEvent),
    SecretLifecycle(SecretLifecycleEvent),
    SecretValueChanged(SecretValueChangedEvent),
    ConnectClose(ConnectCloseEvent),
    Timeout(TimeoutEvent),
    HandleWatch(HandleWatchEvent),
    QemuMonitor(QemuMonitorEvent),
    Stream(StreamEvent),
    AdmConnectClose(AdmConnectCloseEvent),
}

/// A record delivered to typed subscribers of a family's events.
pub trait EventRecord: Sized + Send + 'static {
    /// The kind the record is decoded for
    const KIND: CallbackKind;
    /// The pointer type of the object the event is about
    type Subject: FromSubject;
    /// Borrow the record out of `event` if it is of this kind.
    fn extract(event: &Event) -> Option<&Self>;
}

macro_rules! event_records {
    ($($variant:ident($record:ty) => $subject:ty),* $(,)?) => {
        $(
            impl EventRecord for $record {
                const KIND: CallbackKind = CallbackKind::$variant;
                type Subject = $subject;
                fn extract(event: &Event) -> Option<&Self> {
                    match event {
                        Event::$variant(record) => Some(record),
                        _ => None,
                    }
                }
            }
        )*

        impl Event {
            /// The kind of the event
            pub fn kind(&self) -> CallbackKind {
                match self {
                    $(Event::$variant(_) => CallbackKind::$variant,)*
                    Event::ConnectClose(_) => CallbackKind::ConnectClose,
                    Event::Timeout(_) => CallbackKind::Timeout,
                    Event::HandleWatch(_) => CallbackKind::HandleWatch,
                }
            }
        }
    };
}

event_records!(
    DomainLifecycle(DomainLifecycleEvent) => DomainPtr,
    DomainReboot(DomainRebootEvent) => DomainPtr,
    DomainRtcChange(DomainRtcChangeEvent) => DomainPtr,
    DomainWatchdog(DomainWatchdogEvent) => DomainPtr,
    DomainIoError(DomainIoErrorEvent) => DomainPtr,
    DomainGraphics(DomainGraphicsEvent) => DomainPtr,
    DomainIoErrorReason(DomainIoErrorReasonEvent) => DomainPtr,
    DomainControlError(DomainControlErrorEvent) => DomainPtr,
    DomainBlockJob(DomainBlockJobEvent) => DomainPtr,
    DomainDiskChange(DomainDiskChangeEvent) => DomainPtr,
    DomainTrayChange(DomainTrayChangeEvent) => DomainPtr,
    DomainPmWakeup(DomainPmWakeupEvent) => DomainPtr,
    DomainPmSuspend(DomainPmSuspendEvent) => DomainPtr,
    DomainBalloonChange(DomainBalloonChangeEvent) => DomainPtr,
    DomainPmSuspendDisk(DomainPmSuspendDiskEvent) => DomainPtr,
    DomainDeviceRemoved(DomainDeviceRemovedEvent) => DomainPtr,
    DomainBlockJob2(DomainBlockJob2Event) => DomainPtr,
    DomainTunable(DomainTunableEvent) => DomainPtr,
    DomainAgentLifecycle(DomainAgentLifecycleEvent) => DomainPtr,
    DomainDeviceAdded(DomainDeviceAddedEvent) => DomainPtr,
    DomainMigrationIteration(DomainMigrationIterationEvent) => DomainPtr,
    DomainJobCompleted(DomainJobCompletedEvent) => DomainPtr,
    DomainDeviceRemovalFailed(DomainDeviceRemovalFailedEvent) => DomainPtr,
    DomainMetadataChange(DomainMetadataChangeEvent) => DomainPtr,
    DomainBlockThreshold(DomainBlockThresholdEvent) => DomainPtr,
    DomainMemoryFailure(DomainMemoryFailureEvent) => DomainPtr,
    NetworkLifecycle(NetworkLifecycleEvent) => NetworkPtr,
    StoragePoolLifecycle(StoragePoolLifecycleEvent) => StoragePoolPtr,
    StoragePoolRefresh(StoragePoolRefreshEvent) => StoragePoolPtr,
    NodeDeviceLifecycle(NodeDeviceLifecycleEvent) => NodeDevicePtr,
    NodeDeviceUpdate(NodeDeviceUpdateEvent) => NodeDevicePtr,
    SecretLifecycle(SecretLifecycleEvent) => SecretPtr,
    SecretValueChanged(SecretValueChangedEvent) => SecretPtr,
    QemuMonitor(QemuMonitorEvent) => DomainPtr,
    Stream(StreamEvent) => StreamPtr,
    AdmConnectClose(AdmConnectCloseEvent) => AdmConnectPtr,
);

/// Walks the raw arguments of one dispatch, failing with
/// `EventKindMismatch` on the first argument that does not fit.
struct Args<'a> {
    handle: HandleId,
    kind: CallbackKind,
    args: &'a [RawArg<'a>],
    pos: usize,
}

impl<'a> Args<'a> {
    fn mismatch(&self) -> VirtBridgeError {
        VirtBridgeError::EventKindMismatch {
            handle: self.handle,
            kind: self.kind,
            received: self.args.len(),
        }
    }

    fn next(&mut self) -> Result<RawArg<'a>> {
        let arg = self.args.get(self.pos).copied().ok_or_else(|| self.mismatch())?;
        self.pos += 1;
        Ok(arg)
    }

    fn int(&mut self) -> Result<i32> {
        match self.next()? {
            RawArg::Int(v) => i32::try_from(v).map_err(|_| self.mismatch()),
            _ => Err(self.mismatch()),
        }
    }

    fn long(&mut self) -> Result<i64> {
        match self.next()? {
            RawArg::Int(v) => Ok(v),
            _ => Err(self.mismatch()),
        }
    }

    fn ulong(&mut self) -> Result<u64> {
        match self.next()? {
            RawArg::UInt(v) => Ok(v),
            _ => Err(self.mismatch()),
        }
    }

    fn uint(&mut self) -> Result<u32> {
        let v = self.ulong()?;
        u32::try_from(v).map_err(|_| self.mismatch())
    }

    // null decodes to an empty string
    fn string(&mut self) -> Result<String> {
        match self.next()? {
            RawArg::Str(s) => Ok(s.map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()),
            _ => Err(self.mismatch()),
        }
    }

    fn params(&mut self) -> Result<Vec<TypedParam>> {
        match self.next()? {
            RawArg::Params(p) => Ok(p.to_vec()),
            _ => Err(self.mismatch()),
        }
    }

    fn address(&mut self) -> Result<Option<GraphicsAddress>> {
        match self.next()? {
            RawArg::Address(a) => Ok(a.cloned()),
            _ => Err(self.mismatch()),
        }
    }

    fn identities(&mut self) -> Result<Vec<GraphicsSubjectIdentity>> {
        match self.next()? {
            RawArg::Identities(ids) => Ok(ids.to_vec()),
            _ => Err(self.mismatch()),
        }
    }

    fn finish<T>(self, value: T) -> Result<T> {
        if self.pos == self.args.len() {
            Ok(value)
        } else {
            Err(self.mismatch())
        }
    }
}

impl Event {
    /// Decode the raw arguments a trampoline received for `handle`, which
    /// was registered as `kind`.
    pub fn decode(handle: HandleId, kind: CallbackKind, raw: &RawEvent<'_>) -> Result<(Subject, Event)> {
        use CallbackKind as K;

        let subject = kind.subject(raw.subject);
        let mut a = Args {
            handle,
            kind,
            args: raw.args,
            pos: 0,
        };
        let event = match kind {
            K::DomainLifecycle => Event::DomainLifecycle(DomainLifecycleEvent {
                event: a.int()?.into(),
                detail: a.int()?,
            }),
            K::DomainReboot => Event::DomainReboot(DomainRebootEvent {}),
            K::DomainRtcChange => Event::DomainRtcChange(DomainRtcChangeEvent {
                utc_offset: a.long()?,
            }),
            K::DomainWatchdog => Event::DomainWatchdog(DomainWatchdogEvent {
                action: a.int()?.into(),
            }),
            K::DomainIoError => Event::DomainIoError(DomainIoErrorEvent {
                src_path: a.string()?,
                dev_alias: a.string()?,
                action: a.int()?.into(),
            }),
            K::DomainGraphics => Event::DomainGraphics(DomainGraphicsEvent {
                phase: a.int()?.into(),
                local: a.address()?,
                remote: a.address()?,
                auth_scheme: a.string()?,
                subject: a.identities()?,
            }),
            K::DomainIoErrorReason => Event::DomainIoErrorReason(DomainIoErrorReasonEvent {
                src_path: a.string()?,
                dev_alias: a.string()?,
                action: a.int()?.into(),
                reason: a.string()?,
            }),
            K::DomainControlError => Event::DomainControlError(DomainControlErrorEvent {}),
            K::DomainBlockJob => Event::DomainBlockJob(DomainBlockJobEvent {
                disk: a.string()?,
                job_type: a.int()?.into(),
                status: a.int()?.into(),
            }),
            K::DomainBlockJob2 => Event::DomainBlockJob2(DomainBlockJob2Event {
                disk: a.string()?,
                job_type: a.int()?.into(),
                status: a.int()?.into(),
            }),
            K::DomainDiskChange => Event::DomainDiskChange(DomainDiskChangeEvent {
                old_src_path: a.string()?,
                new_src_path: a.string()?,
                dev_alias: a.string()?,
                reason: a.int()?.into(),
            }),
            K::DomainTrayChange => Event::DomainTrayChange(DomainTrayChangeEvent {
                dev_alias: a.string()?,
                reason: a.int()?.into(),
            }),
            K::DomainPmWakeup => Event::DomainPmWakeup(DomainPmWakeupEvent { reason: a.int()? }),
            K::DomainPmSuspend => Event::DomainPmSuspend(DomainPmSuspendEvent { reason: a.int()? }),
            K::DomainPmSuspendDisk => {
                Event::DomainPmSuspendDisk(DomainPmSuspendDiskEvent { reason: a.int()? })
            }
            K::DomainBalloonChange => Event::DomainBalloonChange(DomainBalloonChangeEvent {
                actual: a.ulong()?,
            }),
            K::DomainDeviceRemoved => Event::DomainDeviceRemoved(DomainDeviceRemovedEvent {
                dev_alias: a.string()?,
            }),
            K::DomainTunable => Event::DomainTunable(DomainTunableEvent {
                params: a.params()?,
            }),
            K::DomainJobCompleted => Event::DomainJobCompleted(DomainJobCompletedEvent {
                params: a.params()?,
            }),
            K::DomainAgentLifecycle => Event::DomainAgentLifecycle(DomainAgentLifecycleEvent {
                state: a.int()?.into(),
                reason: a.int()?.into(),
            }),
            K::DomainDeviceAdded => Event::DomainDeviceAdded(DomainDeviceAddedEvent {
                dev_alias: a.string()?,
            }),
            K::DomainMigrationIteration => {
                Event::DomainMigrationIteration(DomainMigrationIterationEvent {
                    iteration: a.int()?,
                })
            }
            K::DomainDeviceRemovalFailed => {
                Event::DomainDeviceRemovalFailed(DomainDeviceRemovalFailedEvent {
                    dev_alias: a.string()?,
                })
            }
            K::DomainMetadataChange => Event::DomainMetadataChange(DomainMetadataChangeEvent {
                metadata_type: a.int()?.into(),
                ns_uri: a.string()?,
            }),
            K::DomainBlockThreshold => Event::DomainBlockThreshold(DomainBlockThresholdEvent {
                dev: a.string()?,
                path: a.string()?,
                threshold: a.ulong()?,
                excess: a.ulong()?,
            }),
            K::DomainMemoryFailure => Event::DomainMemoryFailure(DomainMemoryFailureEvent {
                recipient: a.int()?.into(),
                action: a.int()?.into(),
                flags: MemoryFailureFlags::from_bits_retain(a.uint()?),
            }),
            K::NetworkLifecycle => Event::NetworkLifecycle(NetworkLifecycleEvent {
                event: a.int()?.into(),
                detail: a.int()?,
            }),
            K::StoragePoolLifecycle => Event::StoragePoolLifecycle(StoragePoolLifecycleEvent {
                event: a.int()?.into(),
                detail: a.int()?,
            }),
            K::StoragePoolRefresh => Event::StoragePoolRefresh(StoragePoolRefreshEvent {}),
            K::NodeDeviceLifecycle => Event::NodeDeviceLifecycle(NodeDeviceLifecycleEvent {
                event: a.int()?.into(),
                detail: a.int()?,
            }),
            K::NodeDeviceUpdate => Event::NodeDeviceUpdate(NodeDeviceUpdateEvent {}),
            K::SecretLifecycle => Event::SecretLifecycle(SecretLifecycleEvent {
                event: a.int()?.into(),
                detail: a.int()?,
            }),
            K::SecretValueChanged => Event::SecretValueChanged(SecretValueChangedEvent {}),
            K::ConnectClose => Event::ConnectClose(ConnectCloseEvent {
                reason: a.int()?.into(),
            }),
            K::Timeout => Event::Timeout(TimeoutEvent { timer: a.int()? }),
            K::HandleWatch => Event::HandleWatch(HandleWatchEvent {
                watch: a.int()?,
                fd: a.int()?,
                events: EventHandleType::from_bits_retain(a.int()?),
            }),
            K::QemuMonitor => Event::QemuMonitor(QemuMonitorEvent {
                event: a.string()?,
                seconds: a.long()?,
                micros: a.uint()?,
                details: a.string()?,
            }),
            K::Stream => Event::Stream(StreamEvent {
                events: StreamEventType::from_bits_retain(a.int()?),
            }),
            K::AdmConnectClose => Event::AdmConnectClose(AdmConnectCloseEvent {
                reason: a.int()?.into(),
            }),
            K::StreamSink | K::StreamSource | K::ConnectAuth | K::EventLoopImpl => {
                return Err(a.mismatch());
            }
        };
        a.finish((subject, event))
    }
}
