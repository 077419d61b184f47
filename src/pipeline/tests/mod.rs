//! Unit tests for the pipeline domain and scheduler internals.

mod state_transition_tests;
