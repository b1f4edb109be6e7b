use super::remote_path::segments;

/// How each segment of a recursive directory creation is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionPolicy {
    /// List the parent first and skip segments that already exist
    CheckExistsFirst,
    /// Issue MKD for every segment; a server refusing an existing directory
    /// stops the plan
    CreateUnconditionally,
}

impl From<bool> for ProvisionPolicy {
    fn from(check_exists_first: bool) -> Self {
        if check_exists_first {
            Self::CheckExistsFirst
        } else {
            Self::CreateUnconditionally
        }
    }
}

/// The next segment to provision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentStep {
    /// Directory the segment is created in, always ending with `/`
    pub parent: String,
    /// Segment name
    pub name: String,
    /// `parent` + `name`, the path handed to MKD
    pub target: String,
}

/// Outcome of a provisioning run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    /// Paths created by this run
    pub created: Vec<String>,
    /// Paths found to exist already
    pub existing: Vec<String>,
}

/// Recursive directory creation as an explicit, resumable sequence of steps.
///
/// The server offers no transaction, so a run can stop part way. The plan
/// keeps a cursor over the segments known to exist; running it again after a
/// failure continues at the segment that failed instead of starting over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryPlan {
    segments: Vec<String>,
    completed: usize,
    policy: ProvisionPolicy,
}

impl DirectoryPlan {
    /// Splits `path` (either separator) into segments
    pub fn new(path: &str, policy: ProvisionPolicy) -> Self {
        Self {
            segments: segments(path),
            completed: 0,
            policy,
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of leading segments known to exist
    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn policy(&self) -> ProvisionPolicy {
        self.policy
    }

    pub fn is_complete(&self) -> bool {
        self.completed >= self.segments.len()
    }

    /// Path of the deepest segment known to exist, `/` if none
    pub fn provisioned_path(&self) -> String {
        format!("/{}", self.segments[..self.completed].join("/"))
    }

    pub fn next_step(&self) -> Option<SegmentStep> {
        let name = self.segments.get(self.completed)?.clone();
        let mut parent = self.provisioned_path();
        if !parent.ends_with('/') {
            parent.push('/');
        }
        let target = format!("{}{}", parent, name);
        Some(SegmentStep {
            parent,
            name,
            target,
        })
    }

    /// Moves the cursor past the current segment
    pub fn advance(&mut self) {
        if !self.is_complete() {
            self.completed += 1;
        }
    }
}
