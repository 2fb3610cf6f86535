//! Best-effort chains for cleanup and capture steps
//!
//! Every step runs even when a previous one failed. Failures are logged as
//! they happen and the first one is handed back by [`BestEffort::finish`].

/// A chain of steps where failures are collected, not propagated
#[derive(Debug, Default)]
pub struct BestEffort {
    first: Option<anyhow::Error>,
    failures: usize,
}

impl BestEffort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one step of the chain
    pub fn run<F>(&mut self, label: &str, step: F) -> &mut Self
    where
        F: FnOnce() -> anyhow::Result<()>,
    {
        if let Err(err) = step() {
            log::error!("{label}: {err:#}");
            self.failures += 1;
            if self.first.is_none() {
                self.first = Some(err);
            }
        }
        self
    }

    /// Number of failed steps so far
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// The first failure of the chain, if any
    pub fn finish(self) -> anyhow::Result<()> {
        match self.first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_all_steps_run() {
        let calls = RefCell::new(Vec::new());
        let mut chain = BestEffort::new();

        chain
            .run("capture logs", || {
                calls.borrow_mut().push("logs");
                anyhow::bail!("no pods")
            })
            .run("capture events", || {
                calls.borrow_mut().push("events");
                Ok(())
            })
            .run("cleanup", || {
                calls.borrow_mut().push("cleanup");
                anyhow::bail!("namespace stuck")
            });

        assert_eq!(chain.failures(), 2);
        assert_eq!(calls.into_inner(), vec!["logs", "events", "cleanup"]);

        let err = chain.finish().unwrap_err();
        assert_eq!(err.to_string(), "no pods");
    }

    #[test]
    fn test_clean_chain() {
        let mut chain = BestEffort::new();
        chain.run("noop", || Ok(()));
        assert_eq!(chain.failures(), 0);
        assert!(chain.finish().is_ok());
    }
}
