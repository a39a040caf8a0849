use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{Result, TreecastError};
use crate::node::{Body, MemberId, Message, Transport};

const FOREVER: u32 = u32::MAX;

/// Transport that records traffic and fails sends on request
pub struct RecordingTransport {
    local: MemberId,
    members: Vec<MemberId>,
    failures: DashMap<MemberId, u32>,
    attempts: DashMap<MemberId, u32>,
    sent: Mutex<Vec<(MemberId, Body)>>,
    replies: Mutex<Vec<(MemberId, Body)>>,
}

impl RecordingTransport {
    pub fn new(local: &str, members: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            local: local.into(),
            members: members.iter().map(|m| MemberId::from(*m)).collect(),
            failures: DashMap::new(),
            attempts: DashMap::new(),
            sent: Mutex::new(Vec::new()),
            replies: Mutex::new(Vec::new()),
        })
    }

    pub fn fail_next(&self, dest: &str, times: u32) {
        self.failures.insert(dest.into(), times);
    }

    pub fn fail_forever(&self, dest: &str) {
        self.failures.insert(dest.into(), FOREVER);
    }

    pub fn attempts(&self, dest: &str) -> u32 {
        self.attempts
            .get(&MemberId::from(dest))
            .map(|a| *a)
            .unwrap_or(0)
    }

    pub fn sent(&self) -> Vec<(MemberId, Body)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self) -> Vec<MemberId> {
        let mut dests: Vec<MemberId> = self.sent().into_iter().map(|(dest, _)| dest).collect();
        dests.sort();
        dests
    }

    pub fn replies(&self) -> Vec<(MemberId, Body)> {
        self.replies.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn local_id(&self) -> Result<MemberId> {
        Ok(self.local.clone())
    }

    fn members(&self) -> Result<Vec<MemberId>> {
        Ok(self.members.clone())
    }

    async fn send(&self, dest: &MemberId, body: Body) -> Result<()> {
        *self.attempts.entry(dest.clone()).or_insert(0) += 1;
        if let Some(mut remaining) = self.failures.get_mut(dest) {
            if *remaining > 0 {
                if *remaining != FOREVER {
                    *remaining -= 1;
                }
                return Err(TreecastError::Timeout(format!("{} is unreachable", dest)));
            }
        }
        self.sent.lock().unwrap().push((dest.clone(), body));
        Ok(())
    }

    async fn reply(&self, request: &Message, body: Body) -> Result<()> {
        self.replies.lock().unwrap().push((request.src.clone(), body));
        Ok(())
    }
}

/// Poll `condition` until it holds, panicking after a few seconds
pub async fn wait_for(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}
