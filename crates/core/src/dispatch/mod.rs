pub mod analysis_dispatcher;
