pub mod decision_handler;
