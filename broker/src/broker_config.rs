use fsbroker_policy::Policy;
use libc::c_int;

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub(crate) policy: Policy,
    pub(crate) fast_check_in_client: bool,
    pub(crate) quiet_failures_for_tests: bool,
    pub(crate) inherited_fds: Vec<c_int>,
}

impl BrokerConfig {
    pub fn new(policy: Policy) -> Self {
        Self {
            policy,
            fast_check_in_client: true,
            quiet_failures_for_tests: false,
            inherited_fds: Vec::new(),
        }
    }

    /// Evaluate the policy in the client too, so that requests certain to be
    /// denied never reach the broker. The broker always re-checks.
    pub fn with_fast_check_in_client(mut self, enabled: bool) -> Self {
        self.fast_check_in_client = enabled;
        self
    }

    /// Don't log communication failures (e.g. in tests which kill the broker)
    pub fn with_quiet_failures_for_tests(mut self, quiet: bool) -> Self {
        self.quiet_failures_for_tests = quiet;
        self
    }

    /// Keep `fd` open in the broker process. Every other descriptor apart
    /// from stdio is closed once the setup hook has run.
    pub fn with_inherited_fd(mut self, fd: c_int) -> Self {
        if !self.inherited_fds.contains(&fd) {
            self.inherited_fds.push(fd);
        }
        self
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }
}
