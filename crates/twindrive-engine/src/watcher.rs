//! Filesystem watcher event mapping and debouncing
//!
//! The notify backend emits raw, platform-specific events. This module
//! flattens them into [`ChangeEvent`]s, forwards them through a channel
//! observer into the async world, and coalesces bursts per path with a
//! [`DebouncedChangeQueue`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use notify::event::{EventKind, ModifyKind, RenameMode};
use tokio::sync::mpsc;

use twindrive_core::ports::IFileObserver;

/// A normalized filesystem change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A file or directory was created
    Created(PathBuf),
    /// File contents were modified
    Modified(PathBuf),
    /// A file or directory was removed
    Deleted(PathBuf),
    /// A file was renamed within the watched tree
    Renamed {
        /// Path before the rename
        old: PathBuf,
        /// Path after the rename
        new: PathBuf,
    },
}

impl ChangeEvent {
    /// Returns the path this event applies to
    ///
    /// For renames this is the new path, which is the one downstream
    /// processing cares about.
    pub fn path(&self) -> &PathBuf {
        match self {
            ChangeEvent::Created(path)
            | ChangeEvent::Modified(path)
            | ChangeEvent::Deleted(path) => path,
            ChangeEvent::Renamed { new, .. } => new,
        }
    }
}

/// Maps a raw notify event to a [`ChangeEvent`], if it is relevant
///
/// Returns `None` for events the engine does not act on (access events,
/// metadata-only changes without a path).
///
/// One-sided renames are split into their observable halves: a
/// `RenameMode::From` becomes a delete and a `RenameMode::To` becomes a
/// create. The classifier pairs them back up through content hashing.
pub fn map_notify_event(event: &notify::Event) -> Option<ChangeEvent> {
    let path = event.paths.first()?.clone();

    match &event.kind {
        EventKind::Create(_) => Some(ChangeEvent::Created(path)),
        EventKind::Remove(_) => Some(ChangeEvent::Deleted(path)),
        EventKind::Modify(ModifyKind::Data(_)) => Some(ChangeEvent::Modified(path)),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            if event.paths.len() >= 2 {
                Some(ChangeEvent::Renamed {
                    old: path,
                    new: event.paths[1].clone(),
                })
            } else {
                Some(ChangeEvent::Modified(path))
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(ChangeEvent::Deleted(path)),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(ChangeEvent::Created(path)),
        EventKind::Modify(_) => Some(ChangeEvent::Modified(path)),
        _ => None,
    }
}

/// Bridges watcher callbacks into an async channel
///
/// The notify backend invokes observer callbacks from its own thread, so
/// delivery uses `blocking_send`. A full or closed channel drops the
/// event with a warning; the next reconcile pass picks up anything lost.
pub struct ChannelObserver {
    tx: mpsc::Sender<ChangeEvent>,
}

impl ChannelObserver {
    /// Creates an observer and the receiving end of its channel
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ChangeEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    fn send(&self, event: ChangeEvent) {
        if let Err(err) = self.tx.blocking_send(event) {
            tracing::warn!(error = %err, "Dropping filesystem event, channel unavailable");
        }
    }
}

impl IFileObserver for ChannelObserver {
    fn on_created(&self, path: PathBuf) {
        self.send(ChangeEvent::Created(path));
    }

    fn on_modified(&self, path: PathBuf) {
        self.send(ChangeEvent::Modified(path));
    }

    fn on_deleted(&self, path: PathBuf) {
        self.send(ChangeEvent::Deleted(path));
    }

    fn on_renamed(&self, from: PathBuf, to: PathBuf) {
        self.send(ChangeEvent::Renamed { old: from, new: to });
    }
}

/// Coalesces rapid event bursts per path
///
/// Editors commonly emit several writes in quick succession for a single
/// save. Each push for a path replaces the previous pending event and
/// resets its timer; an event is only released once its path has been
/// quiet for the full debounce delay. Last event wins.
pub struct DebouncedChangeQueue {
    pending: HashMap<PathBuf, (ChangeEvent, Instant)>,
    debounce_delay: Duration,
}

impl DebouncedChangeQueue {
    /// Creates a queue with the given quiet period
    pub fn new(debounce_delay: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            debounce_delay,
        }
    }

    /// Records an event, replacing any pending event for the same path
    pub fn push(&mut self, event: ChangeEvent) {
        let path = event.path().clone();
        self.pending.insert(path, (event, Instant::now()));
    }

    /// Drains events whose paths have been quiet for the debounce delay
    pub fn poll(&mut self) -> Vec<ChangeEvent> {
        let now = Instant::now();
        let ready: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, (_, at))| now.duration_since(*at) >= self.debounce_delay)
            .map(|(path, _)| path.clone())
            .collect();

        ready
            .into_iter()
            .filter_map(|path| self.pending.remove(&path))
            .map(|(event, _)| event)
            .collect()
    }

    /// Number of events still waiting out their quiet period
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Returns true when nothing is pending
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Discards all pending events
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};

    fn event(kind: EventKind, paths: &[&str]) -> notify::Event {
        let mut ev = notify::Event::new(kind);
        for p in paths {
            ev = ev.add_path(PathBuf::from(p));
        }
        ev
    }

    // -------------------------------------------------------------------
    // map_notify_event
    // -------------------------------------------------------------------

    #[test]
    fn maps_create_event() {
        let ev = event(EventKind::Create(CreateKind::File), &["/tmp/a.txt"]);
        assert_eq!(
            map_notify_event(&ev),
            Some(ChangeEvent::Created(PathBuf::from("/tmp/a.txt")))
        );
    }

    #[test]
    fn maps_remove_event() {
        let ev = event(EventKind::Remove(RemoveKind::File), &["/tmp/a.txt"]);
        assert_eq!(
            map_notify_event(&ev),
            Some(ChangeEvent::Deleted(PathBuf::from("/tmp/a.txt")))
        );
    }

    #[test]
    fn maps_data_modify_event() {
        let ev = event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/tmp/a.txt"],
        );
        assert_eq!(
            map_notify_event(&ev),
            Some(ChangeEvent::Modified(PathBuf::from("/tmp/a.txt")))
        );
    }

    #[test]
    fn maps_two_path_rename() {
        let ev = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/tmp/a.txt", "/tmp/b.txt"],
        );
        assert_eq!(
            map_notify_event(&ev),
            Some(ChangeEvent::Renamed {
                old: PathBuf::from("/tmp/a.txt"),
                new: PathBuf::from("/tmp/b.txt"),
            })
        );
    }

    #[test]
    fn single_path_rename_falls_back_to_modified() {
        let ev = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/tmp/a.txt"],
        );
        assert_eq!(
            map_notify_event(&ev),
            Some(ChangeEvent::Modified(PathBuf::from("/tmp/a.txt")))
        );
    }

    #[test]
    fn rename_from_maps_to_deleted() {
        let ev = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            &["/tmp/a.txt"],
        );
        assert_eq!(
            map_notify_event(&ev),
            Some(ChangeEvent::Deleted(PathBuf::from("/tmp/a.txt")))
        );
    }

    #[test]
    fn rename_to_maps_to_created() {
        let ev = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::To)),
            &["/tmp/b.txt"],
        );
        assert_eq!(
            map_notify_event(&ev),
            Some(ChangeEvent::Created(PathBuf::from("/tmp/b.txt")))
        );
    }

    #[test]
    fn metadata_modify_maps_to_modified() {
        let ev = event(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::WriteTime)),
            &["/tmp/a.txt"],
        );
        assert_eq!(
            map_notify_event(&ev),
            Some(ChangeEvent::Modified(PathBuf::from("/tmp/a.txt")))
        );
    }

    #[test]
    fn access_events_are_ignored() {
        let ev = event(
            EventKind::Access(notify::event::AccessKind::Read),
            &["/tmp/a.txt"],
        );
        assert_eq!(map_notify_event(&ev), None);
    }

    #[test]
    fn events_without_paths_are_ignored() {
        let ev = event(EventKind::Create(CreateKind::File), &[]);
        assert_eq!(map_notify_event(&ev), None);
    }

    // -------------------------------------------------------------------
    // DebouncedChangeQueue
    // -------------------------------------------------------------------

    #[test]
    fn zero_delay_releases_immediately() {
        let mut queue = DebouncedChangeQueue::new(Duration::ZERO);
        queue.push(ChangeEvent::Created(PathBuf::from("/tmp/a.txt")));
        let released = queue.poll();
        assert_eq!(released.len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn events_wait_out_the_quiet_period() {
        let mut queue = DebouncedChangeQueue::new(Duration::from_millis(50));
        queue.push(ChangeEvent::Modified(PathBuf::from("/tmp/a.txt")));

        assert!(queue.poll().is_empty());
        assert_eq!(queue.pending_count(), 1);

        std::thread::sleep(Duration::from_millis(60));
        let released = queue.poll();
        assert_eq!(released.len(), 1);
        assert_eq!(
            released[0],
            ChangeEvent::Modified(PathBuf::from("/tmp/a.txt"))
        );
    }

    #[test]
    fn later_event_replaces_earlier_for_same_path() {
        let mut queue = DebouncedChangeQueue::new(Duration::ZERO);
        queue.push(ChangeEvent::Created(PathBuf::from("/tmp/a.txt")));
        queue.push(ChangeEvent::Modified(PathBuf::from("/tmp/a.txt")));

        let released = queue.poll();
        assert_eq!(released.len(), 1);
        assert_eq!(
            released[0],
            ChangeEvent::Modified(PathBuf::from("/tmp/a.txt"))
        );
    }

    #[test]
    fn push_resets_the_timer() {
        let mut queue = DebouncedChangeQueue::new(Duration::from_millis(80));
        queue.push(ChangeEvent::Modified(PathBuf::from("/tmp/a.txt")));

        std::thread::sleep(Duration::from_millis(50));
        queue.push(ChangeEvent::Modified(PathBuf::from("/tmp/a.txt")));

        std::thread::sleep(Duration::from_millis(50));
        assert!(queue.poll().is_empty(), "timer should have been reset");

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(queue.poll().len(), 1);
    }

    #[test]
    fn distinct_paths_are_tracked_independently() {
        let mut queue = DebouncedChangeQueue::new(Duration::ZERO);
        queue.push(ChangeEvent::Created(PathBuf::from("/tmp/a.txt")));
        queue.push(ChangeEvent::Created(PathBuf::from("/tmp/b.txt")));
        assert_eq!(queue.poll().len(), 2);
    }

    #[test]
    fn clear_discards_pending_events() {
        let mut queue = DebouncedChangeQueue::new(Duration::from_secs(60));
        queue.push(ChangeEvent::Created(PathBuf::from("/tmp/a.txt")));
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.poll().is_empty());
    }

    // -------------------------------------------------------------------
    // ChannelObserver
    // -------------------------------------------------------------------

    #[test]
    fn observer_forwards_callbacks_as_events() {
        let (observer, mut rx) = ChannelObserver::channel(8);

        observer.on_created(PathBuf::from("/tmp/a.txt"));
        observer.on_modified(PathBuf::from("/tmp/a.txt"));
        observer.on_deleted(PathBuf::from("/tmp/b.txt"));
        observer.on_renamed(PathBuf::from("/tmp/c.txt"), PathBuf::from("/tmp/d.txt"));

        assert_eq!(
            rx.try_recv().ok(),
            Some(ChangeEvent::Created(PathBuf::from("/tmp/a.txt")))
        );
        assert_eq!(
            rx.try_recv().ok(),
            Some(ChangeEvent::Modified(PathBuf::from("/tmp/a.txt")))
        );
        assert_eq!(
            rx.try_recv().ok(),
            Some(ChangeEvent::Deleted(PathBuf::from("/tmp/b.txt")))
        );
        assert_eq!(
            rx.try_recv().ok(),
            Some(ChangeEvent::Renamed {
                old: PathBuf::from("/tmp/c.txt"),
                new: PathBuf::from("/tmp/d.txt"),
            })
        );
    }

    #[test]
    fn observer_drops_events_when_receiver_is_gone() {
        let (observer, rx) = ChannelObserver::channel(1);
        drop(rx);
        // Must not panic.
        observer.on_created(PathBuf::from("/tmp/a.txt"));
    }
}
