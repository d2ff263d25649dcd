use super::Xorshift32;

/// Yields an endless sequence of short, collision-resistant endpoint names, each suitable for
/// [`pipeline_ipc::Server::new`]/[`pipeline_ipc::Client::new`].
#[derive(Clone, Debug)]
pub struct NameGen {
    rng: Xorshift32,
    id: &'static str,
}
impl NameGen {
    pub fn new(id: &'static str) -> Self {
        Self { rng: Xorshift32::from_id(id), id }
    }
}
impl Iterator for NameGen {
    type Item = String;
    fn next(&mut self) -> Option<Self::Item> {
        Some(format!("pipeline-ipc-test-{}-{:08x}", self.id, self.rng.next()))
    }
}

macro_rules! make_id {
    () => {
        concat!(file!(), ":", line!(), ":", column!())
    };
}
