/// Failure classes shared by the network and metrics layers
///
/// Validation failures are rejected before any external call, conflicts are
/// refusals from the engine or store, and infrastructure failures mean the
/// engine or database could not be reached at all.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    Conflict,
    Engine,
    Database,
}
