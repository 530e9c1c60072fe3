//! Record store adapter seam
//!
//! The two external collections ("declarations", "payments") are reached
//! through the [`RecordStore`] trait: CRUD plus push-based whole-snapshot
//! subscriptions, mirroring the document store the dashboards run on.
//! [`SledStore`] is the bundled implementation: one sled tree per
//! collection, documents stored as JSON so the persisted field names stay
//! bit-exact, and change feeds built on sled's tree watchers.
//!
//! A status change and its trace entry always land in the same document
//! insert; there is no second write a reader could observe in between.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::thread::JoinHandle;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::declaration::Declaration;
use crate::error::{StoreError, TransitionError};
use crate::payment::PaymentReceipt;

pub type SnapshotCallback<T> = Box<dyn Fn(Vec<T>) + Send + 'static>;

/// Guard for an active change-feed subscription. Dropping it stops the
/// feed and joins the watcher thread.
pub struct Subscription {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// The external collaborator holding both collections. Writes are
/// single-shot; there is no transaction spanning the two collections and
/// no retry loop behind this seam.
pub trait RecordStore: Send + Sync {
    fn declarations(&self) -> anyhow::Result<Vec<Declaration>>;
    fn payments(&self) -> anyhow::Result<Vec<PaymentReceipt>>;
    fn get_declaration(&self, id: &str) -> anyhow::Result<Option<Declaration>>;
    fn get_payment(&self, id: &str) -> anyhow::Result<Option<PaymentReceipt>>;
    /// Upserts the whole document in one write, trace array included.
    fn put_declaration(&self, declaration: &Declaration) -> anyhow::Result<()>;
    fn put_payment(&self, payment: &PaymentReceipt) -> anyhow::Result<()>;
    /// Refuses when the stored status is validated or received.
    fn delete_payment(&self, id: &str) -> anyhow::Result<()>;
    fn subscribe_declarations(&self, on_change: SnapshotCallback<Declaration>) -> Subscription;
    fn subscribe_payments(&self, on_change: SnapshotCallback<PaymentReceipt>) -> Subscription;
}

pub struct SledStore {
    declarations: sled::Tree,
    payments: sled::Tree,
}

impl SledStore {
    pub fn open(db: Arc<sled::Db>) -> anyhow::Result<Self> {
        Ok(Self {
            declarations: db.open_tree("declarations")?,
            payments: db.open_tree("payments")?,
        })
    }

    fn put_doc<T: Serialize>(tree: &sled::Tree, id: &str, doc: &T) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec(doc).map_err(StoreError::Codec)?;
        tree.insert(id, bytes).map_err(StoreError::Unavailable)?;
        Ok(())
    }

    fn get_doc<T: DeserializeOwned>(tree: &sled::Tree, id: &str) -> anyhow::Result<Option<T>> {
        let Some(raw) = tree.get(id).map_err(StoreError::Unavailable)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&raw).map_err(StoreError::Codec)?))
    }

    fn watch<T>(tree: sled::Tree, on_change: SnapshotCallback<T>) -> Subscription
    where
        T: DeserializeOwned + Send + 'static,
    {
        // install the watcher before reading the initial snapshot: sled
        // buffers events from installation time, so a write landing while
        // the snapshot is being delivered is queued instead of lost
        let mut events = tree.watch_prefix(vec![]);

        // deliver the current contents up front, the way the dashboards'
        // snapshot listeners do, then follow the tree's event feed
        on_change(list_docs::<T>(&tree));

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let handle = std::thread::spawn(move || {
            while !stop_flag.load(Ordering::Relaxed) {
                match events.next_timeout(Duration::from_millis(50)) {
                    // any event invalidates the whole snapshot; no delta
                    // state is trusted across events
                    Ok(_) => on_change(list_docs::<T>(&tree)),
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        });
        Subscription {
            stop,
            handle: Some(handle),
        }
    }
}

impl RecordStore for SledStore {
    fn declarations(&self) -> anyhow::Result<Vec<Declaration>> {
        Ok(list_docs(&self.declarations))
    }

    fn payments(&self) -> anyhow::Result<Vec<PaymentReceipt>> {
        Ok(list_docs(&self.payments))
    }

    fn get_declaration(&self, id: &str) -> anyhow::Result<Option<Declaration>> {
        Self::get_doc(&self.declarations, id)
    }

    fn get_payment(&self, id: &str) -> anyhow::Result<Option<PaymentReceipt>> {
        Self::get_doc(&self.payments, id)
    }

    fn put_declaration(&self, declaration: &Declaration) -> anyhow::Result<()> {
        Self::put_doc(&self.declarations, &declaration.id, declaration)
    }

    fn put_payment(&self, payment: &PaymentReceipt) -> anyhow::Result<()> {
        Self::put_doc(&self.payments, &payment.id, payment)
    }

    fn delete_payment(&self, id: &str) -> anyhow::Result<()> {
        let Some(payment) = Self::get_doc::<PaymentReceipt>(&self.payments, id)? else {
            return Err(StoreError::NotFound(id.to_owned()).into());
        };
        // re-checked against the stored document, not the caller's copy
        if !payment.status.deletable() {
            return Err(TransitionError::DeleteValidated.into());
        }
        self.payments.remove(id).map_err(StoreError::Unavailable)?;
        Ok(())
    }

    fn subscribe_declarations(&self, on_change: SnapshotCallback<Declaration>) -> Subscription {
        Self::watch(self.declarations.clone(), on_change)
    }

    fn subscribe_payments(&self, on_change: SnapshotCallback<PaymentReceipt>) -> Subscription {
        Self::watch(self.payments.clone(), on_change)
    }
}

fn list_docs<T: DeserializeOwned>(tree: &sled::Tree) -> Vec<T> {
    let mut docs = Vec::new();
    for item in tree.iter() {
        match item {
            Ok((key, value)) => match serde_json::from_slice(&value) {
                Ok(doc) => docs.push(doc),
                Err(err) => tracing::warn!(
                    key = %String::from_utf8_lossy(&key),
                    %err,
                    "skipping malformed store document"
                ),
            },
            Err(err) => {
                tracing::warn!(%err, "store iteration failed, serving partial snapshot");
                break;
            }
        }
    }
    docs
}
