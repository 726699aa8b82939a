// lottie-data: Serde structs for the Lottie JSON subset written by the exporter
pub mod model;
