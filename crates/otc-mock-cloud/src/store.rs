//! # Store Actor
//!
//! [`StoreActor`] owns every object of one kind and processes its requests one at a time in
//! its own tokio task, so the map needs no lock. Hooks of the [`CloudEntity`] receive the
//! context passed to [`StoreActor::run`], which lets stores consult each other (a subnet
//! checks its VPC, a VPC refuses deletion while subnets exist).
//!
//! ## Status simulation
//!
//! | Event | Effect |
//! |-------|--------|
//! | create / update / action leaves a transitional status | the next `settle_reads` reads still show it, then the settled status |
//! | delete | the next `delete_reads` reads show the deleting status, then 404 |
//! | remove | gone immediately (out-of-band deletion) |

use crate::client::StoreClient;
use crate::entity::CloudEntity;
use crate::error::{ApiError, StoreError};
use crate::message::StoreRequest;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// How long simulated work takes, in reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub settle_reads: u32,
    pub delete_reads: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            settle_reads: 1,
            delete_reads: 1,
        }
    }
}

#[derive(Debug)]
enum Pending {
    Settle { status: String, reads_left: u32 },
    Remove { reads_left: u32 },
}

#[derive(Debug)]
struct Slot<T> {
    seq: u64,
    entity: T,
    pending: Option<Pending>,
}

pub struct StoreActor<T: CloudEntity> {
    receiver: mpsc::Receiver<StoreRequest<T>>,
    store: HashMap<String, Slot<T>>,
    next_seq: u64,
    timing: Timing,
}

impl<T: CloudEntity> StoreActor<T> {
    /// Creates the actor and its client. The actor does nothing until [`Self::run`] is spawned.
    pub fn new(buffer_size: usize, timing: Timing) -> (Self, StoreClient<T>) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let actor = Self {
            receiver,
            store: HashMap::new(),
            next_seq: 1,
            timing,
        };
        (actor, StoreClient::new(sender))
    }

    fn schedule_settle(&self, slot: &mut Slot<T>) {
        let settled = slot.entity.settled_status();
        if slot.entity.status() == settled {
            slot.pending = None;
        } else if self.timing.settle_reads == 0 {
            slot.entity.set_status(&settled);
            slot.pending = None;
        } else {
            slot.pending = Some(Pending::Settle {
                status: settled,
                reads_left: self.timing.settle_reads,
            });
        }
    }

    fn not_found(id: String) -> StoreError {
        StoreError::NotFound { kind: T::KIND, id }
    }

    /// Applies one read to the slot; returns `None` when the entity is gone afterwards.
    fn observe(&mut self, id: &str) -> Option<T> {
        let slot = self.store.get_mut(id)?;
        let mut gone = false;
        match slot.pending.take() {
            Some(Pending::Settle { status, reads_left: 0 }) => {
                debug!(kind = T::KIND, id, %status, "Settled");
                slot.entity.set_status(&status);
            }
            Some(Pending::Settle { status, reads_left }) => {
                slot.pending = Some(Pending::Settle {
                    status,
                    reads_left: reads_left - 1,
                });
            }
            Some(Pending::Remove { reads_left: 0 }) => gone = true,
            Some(Pending::Remove { reads_left }) => {
                slot.pending = Some(Pending::Remove {
                    reads_left: reads_left - 1,
                });
            }
            None => {}
        }
        if gone {
            self.store.remove(id);
            info!(kind = T::KIND, id, size = self.store.len(), "Deleted");
            return None;
        }
        Some(slot.entity.clone())
    }

    fn is_deleting(slot: &Slot<T>) -> bool {
        matches!(slot.pending, Some(Pending::Remove { .. }))
    }

    /// Processes requests until every client is dropped.
    pub async fn run(mut self, context: T::Context) {
        let kind = T::KIND;
        info!(kind, "Store started");

        while let Some(msg) = self.receiver.recv().await {
            match msg {
                StoreRequest::Create { params, respond_to } => {
                    debug!(kind, ?params, "Create");
                    let id = uuid::Uuid::new_v4().to_string();
                    let mut entity = match T::from_create_params(id.clone(), params) {
                        Ok(entity) => entity,
                        Err(e) => {
                            warn!(kind, error = %e, "Create rejected");
                            let _ = respond_to.send(Err(e.into()));
                            continue;
                        }
                    };
                    if let Err(e) = entity.on_create(&context).await {
                        warn!(kind, error = %e, "on_create failed");
                        let _ = respond_to.send(Err(e.into()));
                        continue;
                    }
                    let response = entity.clone();
                    let mut slot = Slot {
                        seq: self.next_seq,
                        entity,
                        pending: None,
                    };
                    self.next_seq += 1;
                    self.schedule_settle(&mut slot);
                    self.store.insert(id.clone(), slot);
                    info!(kind, %id, size = self.store.len(), "Created");
                    let _ = respond_to.send(Ok(response));
                }
                StoreRequest::Get { id, respond_to } => {
                    let item = self.observe(&id);
                    debug!(kind, %id, found = item.is_some(), "Get");
                    let _ = respond_to.send(item.ok_or_else(|| Self::not_found(id)));
                }
                StoreRequest::List { filter, respond_to } => {
                    let mut slots: Vec<&Slot<T>> = self
                        .store
                        .values()
                        .filter(|s| s.entity.matches(&filter))
                        .collect();
                    slots.sort_by_key(|s| s.seq);
                    debug!(kind, ?filter, found = slots.len(), "List");
                    let _ = respond_to.send(Ok(slots.into_iter().map(|s| s.entity.clone()).collect()));
                }
                StoreRequest::Update {
                    id,
                    update,
                    respond_to,
                } => {
                    debug!(kind, %id, ?update, "Update");
                    let Some(mut slot) = self.store.remove(&id) else {
                        warn!(kind, %id, "Not found");
                        let _ = respond_to.send(Err(Self::not_found(id)));
                        continue;
                    };
                    let result = if Self::is_deleting(&slot) {
                        Err(ApiError::conflict(format!("{kind} {id} is being deleted")))
                    } else {
                        slot.entity.on_update(update, &context).await
                    };
                    match result {
                        Ok(()) => {
                            self.schedule_settle(&mut slot);
                            info!(kind, %id, status = slot.entity.status(), "Updated");
                            let _ = respond_to.send(Ok(slot.entity.clone()));
                        }
                        Err(e) => {
                            warn!(kind, %id, error = %e, "Update failed");
                            let _ = respond_to.send(Err(e.into()));
                        }
                    }
                    self.store.insert(id, slot);
                }
                StoreRequest::Delete { id, respond_to } => {
                    debug!(kind, %id, "Delete");
                    let Some(slot) = self.store.get(&id) else {
                        warn!(kind, %id, "Not found");
                        let _ = respond_to.send(Err(Self::not_found(id)));
                        continue;
                    };
                    if Self::is_deleting(slot) {
                        let _ = respond_to.send(Ok(()));
                        continue;
                    }
                    if let Err(e) = slot.entity.on_delete(&context).await {
                        warn!(kind, %id, error = %e, "on_delete failed");
                        let _ = respond_to.send(Err(e.into()));
                        continue;
                    }
                    if self.timing.delete_reads == 0 {
                        self.store.remove(&id);
                        info!(kind, %id, size = self.store.len(), "Deleted");
                    } else if let Some(slot) = self.store.get_mut(&id) {
                        let deleting = slot.entity.deleting_status();
                        slot.entity.set_status(deleting);
                        slot.pending = Some(Pending::Remove {
                            reads_left: self.timing.delete_reads,
                        });
                        info!(kind, %id, "Deleting");
                    }
                    let _ = respond_to.send(Ok(()));
                }
                StoreRequest::Action {
                    id,
                    action,
                    respond_to,
                } => {
                    debug!(kind, %id, ?action, "Action");
                    let Some(slot) = self.store.get_mut(&id) else {
                        warn!(kind, %id, "Not found");
                        let _ = respond_to.send(Err(Self::not_found(id)));
                        continue;
                    };
                    match slot.entity.handle_action(action, &context).await {
                        Ok(()) => {
                            info!(kind, %id, "Action ok");
                            let _ = respond_to.send(Ok(slot.entity.clone()));
                        }
                        Err(e) => {
                            warn!(kind, %id, error = %e, "Action failed");
                            let _ = respond_to.send(Err(e.into()));
                            continue;
                        }
                    }
                    if let Some(mut slot) = self.store.remove(&id) {
                        self.schedule_settle(&mut slot);
                        self.store.insert(id, slot);
                    }
                }
                StoreRequest::Remove { id, respond_to } => {
                    let removed = self.store.remove(&id).is_some();
                    info!(kind, %id, removed, "Removed out of band");
                    let _ = respond_to.send(Ok(removed));
                }
            }
        }

        info!(kind, size = self.store.len(), "Shutdown");
    }
}
