//! FFmpeg audio filter graphs for the dubbing mix.

/// Gain applied to every speech clip before mixing, leaving headroom for the sum.
pub const SPEECH_PRE_GAIN: f64 = 0.6;

/// Label of the mixed speech bus before its gain stage.
pub const LABEL_SPEECH_MIXED: &str = "speech_mixed";
/// Label of the speech bus after the vocal gain.
pub const LABEL_SPEECH_OUT: &str = "speech_out";
/// Label of the background input after its gain.
pub const LABEL_BACKGROUND_OUT: &str = "background_out";
/// Label of the speech + background blend.
pub const LABEL_FINAL_OUT: &str = "final_out";

/// A complete `-filter_complex` graph and the label to map.
#[derive(Debug, Clone, PartialEq)]
pub struct MixGraph {
    pub filter: String,
    pub output_label: String,
}

impl MixGraph {
    /// Output label in `-map` form (`[final_out]`).
    pub fn map_label(&self) -> String {
        format!("[{}]", self.output_label)
    }
}

/// Build the mix graph.
///
/// Speech clips are inputs `0..delays_ms.len()` in order; when `background_volume`
/// is set the background track is the input right after them.
pub fn build_mix_graph(
    delays_ms: &[u64],
    vocal_volume: f64,
    background_volume: Option<f64>,
) -> MixGraph {
    let count = delays_ms.len();
    let mut chains = Vec::with_capacity(count + 3);

    for (i, delay) in delays_ms.iter().enumerate() {
        chains.push(filter_delayed_clip(i, SPEECH_PRE_GAIN, *delay));
    }

    let bus_inputs: String = (0..count).map(|i| format!("[delayed{}]", i)).collect();
    chains.push(format!(
        "{}{}[{}]",
        bus_inputs,
        filter_amix(count),
        LABEL_SPEECH_MIXED
    ));
    chains.push(format!(
        "[{}]volume={}[{}]",
        LABEL_SPEECH_MIXED,
        format_gain(vocal_volume),
        LABEL_SPEECH_OUT
    ));

    let output_label = match background_volume {
        Some(volume) => {
            chains.push(format!(
                "[{}:a]volume={}[{}]",
                count,
                format_gain(volume),
                LABEL_BACKGROUND_OUT
            ));
            chains.push(format!(
                "[{}][{}]{}[{}]",
                LABEL_SPEECH_OUT,
                LABEL_BACKGROUND_OUT,
                filter_amix(2),
                LABEL_FINAL_OUT
            ));
            LABEL_FINAL_OUT
        }
        None => LABEL_SPEECH_OUT,
    };

    MixGraph {
        filter: chains.join(";"),
        output_label: output_label.to_string(),
    }
}

/// Gain then delay for one speech input (`[i:a]volume=G,adelay=D|D[delayedi]`).
pub fn filter_delayed_clip(input_index: usize, gain: f64, delay_ms: u64) -> String {
    format!(
        "[{i}:a]volume={g},adelay={d}|{d}[delayed{i}]",
        i = input_index,
        g = format_gain(gain),
        d = delay_ms
    )
}

/// Equal-weight, non-normalizing `amix` over `inputs` streams.
pub fn filter_amix(inputs: usize) -> String {
    let weights = vec!["1"; inputs].join(" ");
    format!("amix=inputs={}:weights={}:normalize=0", inputs, weights)
}

fn format_gain(gain: f64) -> String {
    if gain.is_finite() {
        format!("{}", gain.max(0.0))
    } else {
        "1".to_string()
    }
}
