// Registry domain: citizens, registration centers, and registrations.
//
// This is the record store the changeset engine mutates. Registrations are
// archive-on-write: rewriting one preserves the superseded version.

pub mod models;
