const MAX_LOG_CHARS: usize = 4096;

enum EscapeMode {
    Esc,
    Csi,
    Osc,
    OscEsc,
}

/// Strip terminal control sequences from a subprocess output line.
///
/// crosstool-ng redraws its progress spinner with bare carriage returns, so
/// only the text after the last `\r` is kept.
pub fn sanitize_log_line(input: &str) -> String {
    let input = input.rsplit('\r').find(|s| !s.is_empty()).unwrap_or("");
    let mut out = String::with_capacity(input.len().min(MAX_LOG_CHARS));
    let mut esc_mode: Option<EscapeMode> = None;
    let mut char_count = 0usize;

    for c in input.chars() {
        if let Some(mode) = esc_mode.as_ref() {
            esc_mode = match mode {
                EscapeMode::Esc => match c {
                    '[' => Some(EscapeMode::Csi),
                    ']' => Some(EscapeMode::Osc),
                    _ => None,
                },
                EscapeMode::Csi if ('@'..='~').contains(&c) => None,
                EscapeMode::Csi => Some(EscapeMode::Csi),
                EscapeMode::Osc if c == '\x07' => None,
                EscapeMode::Osc if c == '\x1b' => Some(EscapeMode::OscEsc),
                EscapeMode::Osc => Some(EscapeMode::Osc),
                EscapeMode::OscEsc if c == '\\' => None,
                EscapeMode::OscEsc => Some(EscapeMode::Osc),
            };
            continue;
        }

        match c {
            '\x1b' => esc_mode = Some(EscapeMode::Esc),
            '\t' => {
                out.push(' ');
                char_count += 1;
            }
            c if c.is_control() => {}
            c => {
                out.push(c);
                char_count += 1;
            }
        }

        if char_count >= MAX_LOG_CHARS {
            out.push_str(" ...[truncated]");
            break;
        }
    }

    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::sanitize_log_line;

    #[test]
    fn strips_colour_codes() {
        let got = sanitize_log_line("[INFO ]  \u{1b}[32mInstalling binutils\u{1b}[0m");
        assert_eq!(got, "[INFO ]  Installing binutils");
    }

    #[test]
    fn keeps_last_spinner_frame() {
        let got = sanitize_log_line("[EXTRA]    Building /\r[EXTRA]    Building -\r");
        assert_eq!(got, "[EXTRA]    Building -");
    }
}
