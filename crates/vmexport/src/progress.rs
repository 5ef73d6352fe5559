use indicatif::{ProgressBar, ProgressStyle};
use vmexport_core::ProgressReporter;

const TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] {prefix:.bold} [{bar:40.cyan/blue}] {pos:>3}% {msg}";

/// Terminal progress bar for disk downloads
pub struct BarReporter {
    bar: ProgressBar,
}

impl BarReporter {
    pub fn new(vm_name: &str) -> Self {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::with_template(TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        bar.set_style(style);
        bar.set_prefix(vm_name.to_string());
        bar.enable_steady_tick(std::time::Duration::from_millis(120));
        Self { bar }
    }

    pub fn finish_success(&self) {
        self.bar.finish_with_message("Export completed ✓");
    }

    pub fn abandon(&self, reason: &str) {
        self.bar.abandon_with_message(reason.to_string());
    }
}

impl ProgressReporter for BarReporter {
    fn start(&self, file_name: &str, _total: Option<u64>) {
        self.bar.set_position(0);
        self.bar.set_message(file_name.to_string());
    }

    fn update(&self, percent: f64) {
        self.bar.set_position(percent.round().clamp(0.0, 100.0) as u64);
    }

    fn describe(&self, description: &str) {
        self.bar.set_message(description.to_string());
    }

    fn finish(&self, file_name: &str) {
        self.bar.set_position(100);
        self.bar.println(format!("  ✓ {}", file_name));
    }
}
