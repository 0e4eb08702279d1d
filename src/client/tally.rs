//! Grouping of replica replies and the quorum decision.

use crate::message::Response;
use crate::ring::ServerNumber;

/// Replicas that returned byte-identical responses.
#[derive(Debug, Clone)]
pub(crate) struct TallyGroup {
    pub(crate) response: Response,
    pub(crate) servers: Vec<ServerNumber>,
}

impl TallyGroup {
    #[inline]
    pub(crate) fn count(&self) -> usize {
        self.servers.len()
    }

    fn lowest_server(&self) -> ServerNumber {
        self.servers.iter().copied().min().unwrap_or(ServerNumber::MAX)
    }
}

/// Responses of one fan-out, grouped by exact byte equality. Only replies
/// actually received are tallied; failed sends leave no trace.
#[derive(Debug, Default)]
pub(crate) struct Tally {
    groups: Vec<TallyGroup>,
}

impl Tally {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&mut self, server: ServerNumber, response: Response) {
        match self.groups.iter_mut().find(|g| g.response == response) {
            Some(group) => group.servers.push(server),
            None => self.groups.push(TallyGroup {
                response,
                servers: vec![server],
            }),
        }
    }

    #[inline]
    pub(crate) fn num_groups(&self) -> usize {
        self.groups.len()
    }

    #[inline]
    pub(crate) fn num_replies(&self) -> usize {
        self.groups.iter().map(TallyGroup::count).sum()
    }

    pub(crate) fn max_count(&self) -> usize {
        self.groups.iter().map(TallyGroup::count).max().unwrap_or(0)
    }

    /// True if more than one group reaches the largest size.
    pub(crate) fn is_tied(&self) -> bool {
        let max = self.max_count();
        self.groups.iter().filter(|g| g.count() == max).count() > 1
    }

    /// Largest group; among equally large groups, the one holding the
    /// lowest server number.
    pub(crate) fn winner(&self) -> Option<&TallyGroup> {
        let max = self.max_count();
        self.groups
            .iter()
            .filter(|g| g.count() == max)
            .min_by_key(|g| g.lowest_server())
    }

    /// Quorum passes when the largest group reaches `commit_count` or forms
    /// a strict majority over the distinct answers.
    pub(crate) fn passes(&self, commit_count: usize) -> bool {
        let max = self.max_count();
        max > 0 && (max >= commit_count || 2 * max > self.num_groups())
    }

    /// Servers outside the winning group.
    pub(crate) fn stale_servers(&self) -> Vec<ServerNumber> {
        let Some(winner) = self.winner() else {
            return vec![];
        };
        let mut stale: Vec<ServerNumber> = self
            .groups
            .iter()
            .filter(|g| g.response != winner.response)
            .flat_map(|g| g.servers.iter().copied())
            .collect();
        stale.sort_unstable();
        stale
    }
}
