//! Kibana resources: spaces and alerting rules.

pub mod alerting_rule;
pub mod space;
