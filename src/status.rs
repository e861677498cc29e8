use stripbar_audio::AudioClient;

const PEAK_CELLS: usize = 8;
const SEPARATOR: &str = " | ";

/// What one status entry shows.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry<'a> {
    pub title: &'a str,
    pub volume: f64,
    pub muted: bool,
    pub peak: Option<f32>,
}

impl<'a> Entry<'a> {
    pub fn from_client(client: &'a AudioClient, show_peaks: bool) -> Self {
        Self {
            title: client.title(),
            volume: client.get_volume(),
            muted: client.is_muted(),
            peak: show_peaks.then(|| client.peak_level()),
        }
    }
}

fn peak_bar(level: f32) -> String {
    let filled = ((level.clamp(0.0, 1.0) * PEAK_CELLS as f32).round() as usize).min(PEAK_CELLS);
    let mut bar = String::with_capacity(PEAK_CELLS + 2);
    bar.push('[');
    bar.extend(std::iter::repeat_n('#', filled));
    bar.extend(std::iter::repeat_n('.', PEAK_CELLS - filled));
    bar.push(']');
    bar
}

pub fn render(entries: &[Entry<'_>]) -> String {
    if entries.is_empty() {
        return "no audio".to_string();
    }
    let parts: Vec<String> = entries
        .iter()
        .map(|e| {
            let mut s = format!("{} {}%", e.title, (e.volume * 100.0).round() as u32);
            if e.muted {
                s.push_str(" [m]");
            }
            if let Some(level) = e.peak {
                s.push(' ');
                s.push_str(&peak_bar(level));
            }
            s
        })
        .collect();
    parts.join(SEPARATOR)
}

/// Remembers the last line so the host only redraws on change.
#[derive(Debug, Default)]
pub struct StatusLine {
    show_peaks: bool,
    last: Option<String>,
}

impl StatusLine {
    pub fn new(show_peaks: bool) -> Self {
        Self {
            show_peaks,
            last: None,
        }
    }

    pub fn update(&mut self, clients: &[AudioClient]) -> Option<&str> {
        let entries: Vec<Entry<'_>> = clients
            .iter()
            .map(|c| Entry::from_client(c, self.show_peaks))
            .collect();
        let line = render(&entries);
        if self.last.as_deref() == Some(line.as_str()) {
            return None;
        }
        self.last = Some(line);
        self.last.as_deref()
    }

    pub fn show_peaks(&self) -> bool {
        self.show_peaks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title: &str, volume: f64, muted: bool) -> Entry<'_> {
        Entry {
            title,
            volume,
            muted,
            peak: None,
        }
    }

    #[test]
    fn master_first_with_percentages() {
        let line = render(&[entry("Speakers", 0.5, false), entry("Browser", 1.0, true)]);
        assert_eq!(line, "Speakers 50% | Browser 100% [m]");
    }

    #[test]
    fn empty_list() {
        assert_eq!(render(&[]), "no audio");
    }

    #[test]
    fn peak_bar_fills_proportionally() {
        assert_eq!(peak_bar(0.0), "[........]");
        assert_eq!(peak_bar(0.5), "[####....]");
        assert_eq!(peak_bar(1.0), "[########]");
        assert_eq!(peak_bar(3.0), "[########]");
        let mut e = entry("Master", 0.333, false);
        e.peak = Some(0.25);
        assert_eq!(render(&[e]), "Master 33% [##......]");
    }

    #[test]
    fn unchanged_line_is_not_redrawn() {
        let mut status = StatusLine::new(false);
        assert_eq!(status.update(&[]), Some("no audio"));
        assert_eq!(status.update(&[]), None);
    }
}
