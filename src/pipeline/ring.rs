// SPDX-License-Identifier: GPL-3.0-only

//! Triple-slot frame hand-off between the capture and display threads
//!
//! Each stream owns exactly three fixed-size slots, allocated once. At any
//! instant every slot carries exactly one role:
//!
//! ```text
//!   producing ──publish──▶ ready ──acquire──▶ consuming
//!       ▲                                        │
//!       └──────────── (roles rotate) ◀───────────┘
//! ```
//!
//! Publishing and acquiring only rewrite role indices; payload bytes are
//! never copied. A slot's memory can be lent out as a [`FrameBuffer`] (to
//! the driver while producing, to the renderer while consuming) and must
//! come back to the same slot, so capture can never write a buffer the
//! renderer holds and the renderer can never read one capture is filling.
//!
//! All state sits behind one mutex with one condition variable, signaled on
//! every publication, format change and close.

use crate::backends::device::{CaptureFormat, StreamKind};
use crate::constants::frame;
use crate::errors::RingError;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// How the consumer waits for frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPolicy {
    /// Wait until both streams have a ready frame (time-aligned pairs)
    Lockstep,
    /// Wait until either stream has a ready frame, or a format change is
    /// outstanding
    Decoupled,
}

impl SyncPolicy {
    /// Whether a consumer waiting under this policy may proceed
    pub fn is_satisfied(self, state: &PipelineState) -> bool {
        let depth = state.depth.is_ready();
        let video = state.video.is_ready();
        match self {
            SyncPolicy::Lockstep => depth && video,
            SyncPolicy::Decoupled => depth || video || state.format.change_pending(),
        }
    }
}

/// Exclusive designation of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotRole {
    Producing,
    Ready,
    Consuming,
}

impl SlotRole {
    const fn index(self) -> usize {
        match self {
            SlotRole::Producing => 0,
            SlotRole::Ready => 1,
            SlotRole::Consuming => 2,
        }
    }
}

/// Stable identity of one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId {
    stream: StreamKind,
    index: u8,
}

impl SlotId {
    pub fn stream(&self) -> StreamKind {
        self.stream
    }

    pub fn index(&self) -> u8 {
        self.index
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.stream.name(), self.index)
    }
}

/// Slot memory lent out of the ring
///
/// Carries the identity of its home slot and, for video, the format the
/// bytes were produced under.
pub struct FrameBuffer {
    slot: SlotId,
    layout: Option<CaptureFormat>,
    data: Box<[u8]>,
}

impl FrameBuffer {
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    /// Format of the frame currently held, `None` if never filled
    pub fn layout(&self) -> Option<CaptureFormat> {
        self.layout
    }
}

impl Deref for FrameBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for FrameBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("slot", &self.slot)
            .field("layout", &self.layout)
            .field("len", &self.data.len())
            .finish()
    }
}

struct BufferSlot {
    id: SlotId,
    layout: Option<CaptureFormat>,
    /// `None` while lent out
    data: Option<Box<[u8]>>,
}

/// The three slots of one stream plus its ready counter
pub struct StreamBufferSet {
    stream: StreamKind,
    slots: [BufferSlot; 3],
    /// Slot index per role, indexed by [`SlotRole::index`]
    roles: [usize; 3],
    /// Publications since the last consumption
    pending: u32,
    published: u64,
    consumed: u64,
    superseded: u64,
}

impl StreamBufferSet {
    fn new(stream: StreamKind, slot_bytes: usize) -> Self {
        let slot = |index: u8| BufferSlot {
            id: SlotId { stream, index },
            layout: None,
            data: Some(vec![0u8; slot_bytes].into_boxed_slice()),
        };
        Self {
            stream,
            slots: [slot(0), slot(1), slot(2)],
            roles: [0, 1, 2],
            pending: 0,
            published: 0,
            consumed: 0,
            superseded: 0,
        }
    }

    fn slot(&self, role: SlotRole) -> &BufferSlot {
        &self.slots[self.roles[role.index()]]
    }

    fn slot_mut(&mut self, role: SlotRole) -> &mut BufferSlot {
        &mut self.slots[self.roles[role.index()]]
    }

    fn swap(&mut self, a: SlotRole, b: SlotRole) {
        self.roles.swap(a.index(), b.index());
    }

    /// Whether a completed, unconsumed frame exists
    pub fn is_ready(&self) -> bool {
        self.pending > 0
    }

    /// Slot currently holding `role`
    pub fn slot_id(&self, role: SlotRole) -> SlotId {
        self.slot(role).id
    }

    /// The producing slot was filled: make it the ready one
    fn publish(&mut self) {
        self.swap(SlotRole::Producing, SlotRole::Ready);
        if self.pending > 0 {
            self.superseded += 1;
        }
        self.pending = self.pending.saturating_add(1);
        self.published += 1;
        trace!(
            stream = self.stream.name(),
            ready = %self.slot_id(SlotRole::Ready),
            "Published frame"
        );
    }

    /// Put a lent producing buffer back, publish it, and lend the slot that
    /// becomes producing. Nothing changes if the buffer is rejected.
    fn publish_lent(&mut self, filled: FrameBuffer) -> Result<FrameBuffer, RejectedBuffer> {
        let stream = self.stream.name();
        let producing = self.slot(SlotRole::Producing);
        if producing.id != filled.slot || producing.data.is_some() {
            return Err(RejectedBuffer {
                error: RingError::ForeignBuffer(stream),
                buffer: filled,
            });
        }
        let ready = self.slot_mut(SlotRole::Ready);
        let Some(spare_data) = ready.data.take() else {
            return Err(RejectedBuffer {
                error: RingError::AlreadyLent(stream),
                buffer: filled,
            });
        };
        let spare = FrameBuffer {
            slot: ready.id,
            layout: ready.layout,
            data: spare_data,
        };

        let producing = self.slot_mut(SlotRole::Producing);
        producing.layout = filled.layout;
        producing.data = Some(filled.data);
        self.publish();
        Ok(spare)
    }

    /// Move a consumer's lease onto the ready slot and lend the ready
    /// slot's memory in its place
    fn consume_into(&mut self, lease: &mut FrameBuffer) -> Result<(), RingError> {
        if lease.slot != self.slot_id(SlotRole::Consuming) {
            return Err(RingError::ForeignBuffer(self.stream.name()));
        }
        self.swap(SlotRole::Ready, SlotRole::Consuming);
        self.pending = 0;
        self.consumed += 1;

        let fresh = self.lend(SlotRole::Consuming)?;
        let stale = std::mem::replace(lease, fresh);
        self.reclaim(SlotRole::Ready, stale)
    }

    fn lend(&mut self, role: SlotRole) -> Result<FrameBuffer, RingError> {
        let stream = self.stream.name();
        let slot = self.slot_mut(role);
        let data = slot.data.take().ok_or(RingError::AlreadyLent(stream))?;
        Ok(FrameBuffer {
            slot: slot.id,
            layout: slot.layout,
            data,
        })
    }

    fn reclaim(&mut self, role: SlotRole, buffer: FrameBuffer) -> Result<(), RingError> {
        let stream = self.stream.name();
        let slot = self.slot_mut(role);
        if slot.id != buffer.slot || slot.data.is_some() {
            return Err(RingError::ForeignBuffer(stream));
        }
        slot.layout = buffer.layout;
        slot.data = Some(buffer.data);
        Ok(())
    }

    fn snapshot(&self) -> StreamSnapshot {
        StreamSnapshot {
            producing: self.slot_id(SlotRole::Producing),
            ready: self.slot_id(SlotRole::Ready),
            consuming: self.slot_id(SlotRole::Consuming),
            lent: self
                .slots
                .iter()
                .filter(|s| s.data.is_none())
                .map(|s| s.id)
                .collect(),
            pending: self.pending,
            published: self.published,
            consumed: self.consumed,
            superseded: self.superseded,
        }
    }
}

/// Requested vs. active capture format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatState {
    /// Format the device is actually producing; the only one render code
    /// may branch on
    pub current: CaptureFormat,
    /// Format asked for by the input side
    pub requested: CaptureFormat,
}

impl FormatState {
    pub fn new(format: CaptureFormat) -> Self {
        Self {
            current: format,
            requested: format,
        }
    }

    pub fn change_pending(&self) -> bool {
        self.current != self.requested
    }
}

/// Everything guarded by the pipeline lock
pub struct PipelineState {
    depth: StreamBufferSet,
    video: StreamBufferSet,
    format: FormatState,
    closed: bool,
}

impl PipelineState {
    pub fn stream(&self, kind: StreamKind) -> &StreamBufferSet {
        match kind {
            StreamKind::Depth => &self.depth,
            StreamKind::Video => &self.video,
        }
    }

    fn stream_mut(&mut self, kind: StreamKind) -> &mut StreamBufferSet {
        match kind {
            StreamKind::Depth => &mut self.depth,
            StreamKind::Video => &mut self.video,
        }
    }

    pub fn format(&self) -> FormatState {
        self.format
    }

    /// Exchange the producing and ready labels of `kind` and count the
    /// frame. Holding `&mut PipelineState` means holding the lock.
    pub fn publish(&mut self, kind: StreamKind) {
        self.stream_mut(kind).publish();
    }

    fn should_wake(&self) -> bool {
        self.closed || self.format.current.sync_policy().is_satisfied(self)
    }
}

/// Point-in-time view of one stream's slots, for diagnostics and tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSnapshot {
    pub producing: SlotId,
    pub ready: SlotId,
    pub consuming: SlotId,
    /// Slots whose memory is currently lent out
    pub lent: Vec<SlotId>,
    pub pending: u32,
    pub published: u64,
    pub consumed: u64,
    /// Frames published over an unconsumed ready frame
    pub superseded: u64,
}

impl StreamSnapshot {
    /// The three slot identities, sorted
    pub fn slot_ids(&self) -> [SlotId; 3] {
        let mut ids = [self.producing, self.ready, self.consuming];
        ids.sort();
        ids
    }
}

/// The consumer's two lent buffers
#[derive(Debug)]
pub struct ConsumerLeases {
    depth: FrameBuffer,
    video: FrameBuffer,
}

impl ConsumerLeases {
    pub fn depth(&self) -> &FrameBuffer {
        &self.depth
    }

    pub fn video(&self) -> &FrameBuffer {
        &self.video
    }

    fn get_mut(&mut self, kind: StreamKind) -> &mut FrameBuffer {
        match kind {
            StreamKind::Depth => &mut self.depth,
            StreamKind::Video => &mut self.video,
        }
    }
}

/// Result of one consumer acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Leases were exchanged for every stream flagged `true`
    Frames {
        depth: bool,
        video: bool,
        format: CaptureFormat,
    },
    /// `requested != current`: nothing was exchanged
    FormatChangePending,
    /// The producer has shut down
    Closed,
}

/// A video buffer the ring refused, handed back so the driver still has
/// memory to fill
#[derive(Debug)]
pub struct RejectedBuffer {
    pub error: RingError,
    pub buffer: FrameBuffer,
}

/// Shared frame hand-off state for both streams
pub struct FrameBufferRing {
    state: Mutex<PipelineState>,
    frame_ready: Condvar,
}

impl FrameBufferRing {
    /// Allocate all six slots
    pub fn new(depth_slot_bytes: usize, video_slot_bytes: usize, format: CaptureFormat) -> Self {
        debug!(
            depth_slot_bytes,
            video_slot_bytes,
            format = %format,
            "Allocating frame buffer ring"
        );
        Self {
            state: Mutex::new(PipelineState {
                depth: StreamBufferSet::new(StreamKind::Depth, depth_slot_bytes),
                video: StreamBufferSet::new(StreamKind::Video, video_slot_bytes),
                format: FormatState::new(format),
                closed: false,
            }),
            frame_ready: Condvar::new(),
        }
    }

    /// Ring sized for colorized depth and RGB video at sensor resolution
    pub fn for_sensor(format: CaptureFormat) -> Self {
        Self::new(frame::RGB_BYTES, frame::RGB_BYTES, format)
    }

    // Label swaps complete before any code that could panic, so the state
    // behind a poisoned lock is still consistent.
    fn lock(&self) -> MutexGuard<'_, PipelineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fill the producing depth slot under the lock, then publish it
    pub fn produce_depth<F>(&self, fill: F) -> Result<(), RingError>
    where
        F: FnOnce(&mut [u8]),
    {
        let mut state = self.lock();
        let slot = state.depth.slot_mut(SlotRole::Producing);
        let data = slot
            .data
            .as_deref_mut()
            .ok_or(RingError::AlreadyLent(StreamKind::Depth.name()))?;
        fill(data);
        state.publish(StreamKind::Depth);
        self.frame_ready.notify_all();
        Ok(())
    }

    /// Lend the producing slot of `kind` (the driver's first video buffer)
    pub fn lend_producing(&self, kind: StreamKind) -> Result<FrameBuffer, RingError> {
        self.lock().stream_mut(kind).lend(SlotRole::Producing)
    }

    /// Return a producing buffer without publishing it
    pub fn reclaim_producing(&self, buffer: FrameBuffer) -> Result<(), RingError> {
        let kind = buffer.slot.stream;
        self.lock().stream_mut(kind).reclaim(SlotRole::Producing, buffer)
    }

    /// Publish a filled video buffer and lend the next producing buffer
    ///
    /// The filled buffer must be the one currently lent for the producing
    /// role; otherwise it is handed back untouched.
    pub fn publish_video(
        &self,
        mut filled: FrameBuffer,
        format: CaptureFormat,
    ) -> Result<FrameBuffer, RejectedBuffer> {
        let mut state = self.lock();
        filled.layout = Some(format);
        let spare = state.video.publish_lent(filled)?;
        self.frame_ready.notify_all();
        Ok(spare)
    }

    /// Lend both consuming slots to the display side
    pub fn lease_consumers(&self) -> Result<ConsumerLeases, RingError> {
        let mut state = self.lock();
        let depth = state.depth.lend(SlotRole::Consuming)?;
        let video = match state.video.lend(SlotRole::Consuming) {
            Ok(video) => video,
            Err(e) => {
                state.depth.reclaim(SlotRole::Consuming, depth)?;
                return Err(e);
            }
        };
        Ok(ConsumerLeases { depth, video })
    }

    /// Block until the current format's policy is satisfied, then exchange
    /// the consumer's leases for the latest ready frames
    pub fn acquire_latest(&self, leases: &mut ConsumerLeases) -> Result<AcquireOutcome, RingError> {
        let state = self.lock();
        let mut state = self
            .frame_ready
            .wait_while(state, |s| !s.should_wake())
            .unwrap_or_else(PoisonError::into_inner);
        Self::exchange(&mut state, leases)
    }

    /// Like [`Self::acquire_latest`], but returns `None` instead of waiting
    pub fn try_acquire_latest(
        &self,
        leases: &mut ConsumerLeases,
    ) -> Result<Option<AcquireOutcome>, RingError> {
        let mut state = self.lock();
        if !state.should_wake() {
            return Ok(None);
        }
        Self::exchange(&mut state, leases).map(Some)
    }

    fn exchange(
        state: &mut PipelineState,
        leases: &mut ConsumerLeases,
    ) -> Result<AcquireOutcome, RingError> {
        if state.closed {
            return Ok(AcquireOutcome::Closed);
        }
        if state.format.change_pending() {
            return Ok(AcquireOutcome::FormatChangePending);
        }

        let mut fresh = [false; 2];
        for (i, kind) in StreamKind::ALL.into_iter().enumerate() {
            let set = state.stream_mut(kind);
            if set.is_ready() {
                set.consume_into(leases.get_mut(kind))?;
                fresh[i] = true;
            }
        }

        Ok(AcquireOutcome::Frames {
            depth: fresh[0],
            video: fresh[1],
            format: state.format.current,
        })
    }

    /// Current/requested format pair
    pub fn format(&self) -> FormatState {
        self.lock().format
    }

    /// Record a format request from the input side
    pub fn request_format(&self, format: CaptureFormat) {
        let mut state = self.lock();
        state.format.requested = format;
        debug!(current = %state.format.current, requested = %format, "Format requested");
        self.frame_ready.notify_all();
    }

    /// The producer switched the device to `format`
    ///
    /// Any ready video frame was produced under the old layout and is
    /// dropped from the ready position.
    pub fn confirm_format(&self, format: CaptureFormat) {
        let mut state = self.lock();
        state.format.current = format;
        state.video.pending = 0;
        debug!(format = %format, "Format switch confirmed");
        self.frame_ready.notify_all();
    }

    /// Wake every waiter for good; later acquisitions return `Closed`
    pub fn close(&self) {
        self.lock().closed = true;
        self.frame_ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn snapshot(&self, kind: StreamKind) -> StreamSnapshot {
        self.lock().stream(kind).snapshot()
    }
}
