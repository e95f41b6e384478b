pub mod server;

use alloy::primitives::{Address, U256};
use prometheus::{
    Encoder, Gauge, GaugeVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use tracing::error;

pub struct Metrics {
    registry: Registry,
    service_state: IntGaugeVec,
    in_flight_submissions: IntGaugeVec,
    submissions: IntCounterVec,
    submission_errors: IntCounterVec,
    service_faults: IntCounterVec,
    deposits: IntCounterVec,
    l2_balance: GaugeVec,
    oracle_l1_value: Gauge,
    oracle_l2_value: Gauge,
    critical_errors: IntCounter,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

// Converts a wei amount to f64 for gauge display only.
fn u256_to_f64(value: U256) -> f64 {
    value.to_string().parse().unwrap_or(f64::MAX)
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let service_state = IntGaugeVec::new(
            Opts::new(
                "service_state",
                "Current state machine state of a service (see ServiceState ordinal)",
            ),
            &["service"],
        )
        .expect("valid service_state metric");
        let in_flight_submissions = IntGaugeVec::new(
            Opts::new(
                "in_flight_submissions",
                "Transactions submitted and not yet settled",
            ),
            &["service"],
        )
        .expect("valid in_flight_submissions metric");
        let submissions = IntCounterVec::new(
            Opts::new("submissions_total", "Transactions submitted"),
            &["service"],
        )
        .expect("valid submissions_total metric");
        let submission_errors = IntCounterVec::new(
            Opts::new("submission_errors_total", "Failed transaction submissions"),
            &["service"],
        )
        .expect("valid submission_errors_total metric");
        let service_faults = IntCounterVec::new(
            Opts::new("service_faults_total", "Services that reached the Faulted state"),
            &["service"],
        )
        .expect("valid service_faults_total metric");
        let deposits = IntCounterVec::new(
            Opts::new("deposits_total", "Confirmed L1 portal deposits"),
            &["address"],
        )
        .expect("valid deposits_total metric");
        let l2_balance = GaugeVec::new(
            Opts::new("l2_balance_wei", "Observed L2 balance of a watched account"),
            &["address"],
        )
        .expect("valid l2_balance_wei metric");
        let oracle_l1_value = Gauge::new("oracle_l1_value", "Last value read from the L1 oracle")
            .expect("valid oracle_l1_value metric");
        let oracle_l2_value = Gauge::new(
            "oracle_l2_value",
            "Last value read from the L2 oracle contract",
        )
        .expect("valid oracle_l2_value metric");
        let critical_errors = IntCounter::new("critical_errors", "Critical errors")
            .expect("valid critical_errors metric");

        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(service_state.clone()),
            Box::new(in_flight_submissions.clone()),
            Box::new(submissions.clone()),
            Box::new(submission_errors.clone()),
            Box::new(service_faults.clone()),
            Box::new(deposits.clone()),
            Box::new(l2_balance.clone()),
            Box::new(oracle_l1_value.clone()),
            Box::new(oracle_l2_value.clone()),
            Box::new(critical_errors.clone()),
        ];
        for collector in collectors {
            registry
                .register(collector)
                .expect("metric names are unique");
        }

        Self {
            registry,
            service_state,
            in_flight_submissions,
            submissions,
            submission_errors,
            service_faults,
            deposits,
            l2_balance,
            oracle_l1_value,
            oracle_l2_value,
            critical_errors,
        }
    }

    pub fn set_service_state(&self, service: &str, state_ordinal: i64) {
        self.service_state
            .with_label_values(&[service])
            .set(state_ordinal);
    }

    pub fn set_in_flight_submissions(&self, service: &str, in_flight: i64) {
        self.in_flight_submissions
            .with_label_values(&[service])
            .set(in_flight);
    }

    pub fn inc_submissions(&self, service: &str) {
        self.submissions.with_label_values(&[service]).inc();
    }

    pub fn inc_submission_errors(&self, service: &str) {
        self.submission_errors.with_label_values(&[service]).inc();
    }

    pub fn inc_service_faults(&self, service: &str) {
        self.service_faults.with_label_values(&[service]).inc();
    }

    pub fn inc_deposits(&self, address: Address) {
        self.deposits
            .with_label_values(&[address.to_string().as_str()])
            .inc();
    }

    pub fn set_l2_balance(&self, address: Address, balance: U256) {
        self.l2_balance
            .with_label_values(&[address.to_string().as_str()])
            .set(u256_to_f64(balance));
    }

    pub fn set_oracle_values(&self, l1_value: U256, l2_value: U256) {
        self.oracle_l1_value.set(u256_to_f64(l1_value));
        self.oracle_l2_value.set(u256_to_f64(l2_value));
    }

    pub fn inc_critical_errors(&self) {
        self.critical_errors.inc();
    }

    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            error!("Failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
