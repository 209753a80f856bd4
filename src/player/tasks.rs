use tokio::task::JoinHandle;

/// Background work owned by one player.
#[derive(Default)]
pub struct BackgroundTasks {
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl BackgroundTasks {
    pub fn push(&mut self, name: &'static str, handle: JoinHandle<()>) {
        self.handles.retain(|(_, h)| !h.is_finished());
        self.handles.push((name, handle));
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.handles.iter().map(|(name, _)| *name).collect()
    }

    /// Aborts everything. Calling it again is a no-op.
    pub fn cancel_all(&mut self) {
        for (name, handle) in self.handles.drain(..) {
            tracing::trace!("Cancelling player task {}", name);
            handle.abort();
        }
    }
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancel_all_aborts_and_is_idempotent() {
        let mut tasks = BackgroundTasks::default();
        let (tx, rx) = flume::bounded::<()>(1);
        tasks.push(
            "sleeper",
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                let _ = tx.send(());
            }),
        );
        assert_eq!(tasks.names(), vec!["sleeper"]);

        tasks.cancel_all();
        tasks.cancel_all();
        assert!(tasks.is_empty());
        assert!(rx.recv_async().await.is_err());
    }
}
