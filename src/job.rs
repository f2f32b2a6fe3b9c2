//! Registry of background pipelines.
//!
//! Background children are not waited for when they start. The interpreter
//! calls [`JobTable::reap`] before each prompt so finished jobs are collected
//! and reported instead of lingering in the process table.

use crate::command::ExitCode;
use nix::errno::Errno;
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

pub(crate) trait WaitStatusExt {
    /// Shell-style status for a terminated process, `None` while it runs.
    fn code(self) -> Option<ExitCode>;
}

impl WaitStatusExt for WaitStatus {
    fn code(self) -> Option<ExitCode> {
        match self {
            WaitStatus::Exited(_, code) => Some(code),
            WaitStatus::Signaled(_, signal, _) => Some(128 + signal as i32),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Process {
    pid: Pid,
    status: Option<ExitCode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Job {
    line: String,
    processes: Vec<Process>,
}

impl Job {
    fn is_done(&self) -> bool {
        self.processes.iter().all(|pr| pr.status.is_some())
    }
}

/// A background job that has finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedJob {
    pub id: usize,
    pub line: String,
    /// Status of the last stage.
    pub status: ExitCode,
}

#[derive(Debug, Default)]
pub struct JobTable {
    jobs: BTreeMap<usize, Job>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the processes of one background pipeline, in stage order.
    ///
    /// Returns the job id: the lowest positive id not in use.
    pub fn register(&mut self, pids: Vec<Pid>, line: impl Into<String>) -> usize {
        let id = (1..)
            .find(|id| !self.jobs.contains_key(id))
            .unwrap_or(self.jobs.len() + 1);
        let processes = pids
            .into_iter()
            .map(|pid| Process { pid, status: None })
            .collect();
        let line = line.into();
        info!(id, %line, "background job registered");
        self.jobs.insert(id, Job { line, processes });
        id
    }

    /// Collect every finished job without blocking.
    pub fn reap(&mut self) -> Vec<FinishedJob> {
        for job in self.jobs.values_mut() {
            for pr in job.processes.iter_mut().filter(|pr| pr.status.is_none()) {
                match waitpid(pr.pid, Some(WaitPidFlag::WNOHANG)) {
                    Ok(WaitStatus::StillAlive) => {}
                    Ok(status) => {
                        if let Some(code) = status.code() {
                            debug!(pid = pr.pid.as_raw(), code, "background process finished");
                            pr.status = Some(code);
                        }
                    }
                    Err(Errno::ECHILD) => {
                        // already reaped elsewhere, nothing left to wait for
                        pr.status = Some(0);
                    }
                    Err(e) => warn!(pid = pr.pid.as_raw(), error = %e, "waitpid failed"),
                }
            }
        }

        let done: Vec<usize> = self
            .jobs
            .iter()
            .filter(|(_, job)| job.is_done())
            .map(|(id, _)| *id)
            .collect();
        done.into_iter()
            .filter_map(|id| self.jobs.remove(&id).map(|job| (id, job)))
            .map(|(id, job)| FinishedJob {
                id,
                status: job
                    .processes
                    .last()
                    .and_then(|pr| pr.status)
                    .unwrap_or_default(),
                line: job.line,
            })
            .collect()
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.jobs
            .values()
            .any(|job| job.processes.iter().any(|pr| pr.pid == pid))
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
