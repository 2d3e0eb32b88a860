use chexmix_rs::component::{ComponentLabel, CompositeModelComponent};
use chexmix_rs::composite::{CompositeProfile, CompositeTagDistribution};
use chexmix_rs::config::ModelConfig;
use chexmix_rs::density::TagProbabilityDensity;
use chexmix_rs::error::ChexmixError;
use chexmix_rs::model::ProteinDnaInteractionModel;
use ndarray::Array2;
use rstest::rstest;
use tempfile::tempdir;

const WIDTH: usize = 101;
const CENTER: i32 = 50;

fn composite(num_conditions: usize) -> CompositeTagDistribution {
    let mut watson = Array2::<f64>::zeros((num_conditions, WIDTH));
    let mut crick = Array2::<f64>::zeros((num_conditions, WIDTH));
    for c in 0..num_conditions {
        for x in 0..WIDTH {
            watson[[c, x]] = (x % 7) as f64 + c as f64 * 0.5;
            crick[[c, x]] = (x % 3) as f64 / 3.0;
        }
    }
    CompositeTagDistribution::new(watson, crick, CENTER).unwrap()
}

fn config() -> ModelConfig {
    ModelConfig {
        xl_component_spacing: 5,
        init_cs_to_xl_ratio: 0.5,
        min_cs_pi: 0.05,
        ..ModelConfig::default()
    }
}

/// ChIP-signal seed with influence range 40, leaving room for four cross-links at spacing 5
fn build_model(noise_pi: f64) -> ProteinDnaInteractionModel {
    let xl_seed = TagProbabilityDensity::gaussian(-10, 10, 0.0, 2.0).unwrap();
    let cs_seed = TagProbabilityDensity::gaussian(-20, 20, 0.0, 6.0).unwrap();
    let background_seed = TagProbabilityDensity::uniform(-50, 50).unwrap();
    ProteinDnaInteractionModel::new(
        &config(),
        &composite(2),
        &xl_seed,
        cs_seed,
        background_seed,
        noise_pi,
    )
    .unwrap()
}

#[test]
fn test_initial_pi_values() {
    let model = build_model(0.1);
    assert_eq!(model.cross_links().len(), 4);
    assert_eq!(model.num_components(), 6);
    assert!((model.background().pi() - 0.1).abs() < 1e-12);
    assert!((model.chip_signal().pi() - 0.45).abs() < 1e-12);
    for xl in model.cross_links() {
        assert!((xl.pi() - 0.1125).abs() < 1e-12);
    }
    assert!((model.pi_total() - 1.0).abs() < 1e-9);
}

#[rstest]
#[case(0.0)]
#[case(0.1)]
#[case(0.5)]
#[case(0.97)]
#[case(1.0)]
fn test_pis_sum_to_one(#[case] noise_pi: f64) {
    let model = build_model(noise_pi);
    assert!((model.pi_total() - 1.0).abs() < 1e-9);
    assert!(model.components().all(|c| c.pi() >= 0.0));
}

#[test]
fn test_min_cs_pi_floor() {
    let cfg = ModelConfig {
        init_cs_to_xl_ratio: 0.01,
        min_cs_pi: 0.2,
        ..config()
    };
    let model = ProteinDnaInteractionModel::new(
        &cfg,
        &composite(1),
        &TagProbabilityDensity::uniform(-5, 5).unwrap(),
        TagProbabilityDensity::uniform(-20, 20).unwrap(),
        TagProbabilityDensity::uniform(-50, 50).unwrap(),
        0.1,
    )
    .unwrap();
    assert!((model.chip_signal().pi() - 0.2).abs() < 1e-12);
    assert!((model.pi_total() - 1.0).abs() < 1e-9);
}

#[test]
fn test_component_layout() {
    let model = build_model(0.1);
    assert_eq!(model.width(), WIDTH);
    assert_eq!(model.center_offset(), CENTER);
    assert_eq!(model.num_conditions(), 2);
    assert_eq!(model.background().label(), ComponentLabel::Background);
    assert_eq!(model.background().position(), CENTER);
    assert_eq!(model.chip_signal().label(), ComponentLabel::ChipSignal);
    assert_eq!(model.chip_signal().position(), CENTER);

    let positions: Vec<i32> = model.cross_links().iter().map(|c| c.position()).collect();
    assert_eq!(positions, vec![40, 45, 50, 55]);
    let indices: Vec<usize> = model.components().map(|c| c.index()).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
    for comp in model.components() {
        assert_eq!(comp.density().index(), comp.index());
    }
}

#[test]
fn test_cross_link_densities_are_independent() {
    let mut model = build_model(0.1);
    let before = model.cross_links()[1].density().clone();
    let mut sharp = vec![0.0; 21];
    sharp[10] = 1.0;
    model.cross_links_mut()[0].density_mut().update(&sharp).unwrap();

    assert_eq!(model.cross_links()[0].density().probability(0), 1.0);
    for xl in &model.cross_links()[1..] {
        assert_eq!(xl.density().probabilities(), before.probabilities());
    }
}

#[test]
fn test_no_room_for_cross_links() {
    let model = ProteinDnaInteractionModel::new(
        &config(),
        &composite(1),
        &TagProbabilityDensity::uniform(-5, 5).unwrap(),
        TagProbabilityDensity::uniform(-2, 2).unwrap(),
        TagProbabilityDensity::uniform(-50, 50).unwrap(),
        0.1,
    )
    .unwrap();
    assert!(model.cross_links().is_empty());
    assert!((model.chip_signal().pi() - 0.9).abs() < 1e-12);
    assert!((model.pi_total() - 1.0).abs() < 1e-9);

    let reloaded = ProteinDnaInteractionModel::load_str(&model.save_string()).unwrap();
    assert_eq!(reloaded.num_components(), 2);
    assert!(reloaded.cross_links().is_empty());
}

#[test]
fn test_invalid_noise_pi() {
    let result = ProteinDnaInteractionModel::new(
        &config(),
        &composite(1),
        &TagProbabilityDensity::uniform(-5, 5).unwrap(),
        TagProbabilityDensity::uniform(-20, 20).unwrap(),
        TagProbabilityDensity::uniform(-50, 50).unwrap(),
        1.5,
    );
    assert!(matches!(result, Err(ChexmixError::InvalidParameter { .. })));
}

#[test]
fn test_non_zero_components_and_pruning() {
    let mut model = build_model(0.1);
    assert_eq!(model.non_zero_components().len(), 6);

    model.set_pis(&[0.1, 0.5, 0.3, 0.0, 0.05, 0.05]).unwrap();
    assert!((model.pi_total() - 1.0).abs() < 1e-9);
    let active: Vec<usize> = model.non_zero_components().iter().map(|c| c.index()).collect();
    assert_eq!(active, vec![0, 1, 2, 4, 5]);

    let pruned = model.prune_components(0.06);
    assert_eq!(pruned, 2);
    let active: Vec<usize> = model.non_zero_components().iter().map(|c| c.index()).collect();
    assert_eq!(active, vec![0, 1, 2]);
    assert!((model.pi_total() - 1.0).abs() < 1e-9);
    assert!((model.chip_signal().pi() - 0.5 / 0.9).abs() < 1e-9);
}

#[test]
fn test_epsilon_hides_small_components() {
    let mut model = build_model(0.1);
    model.set_min_component_pi(0.2);
    let active: Vec<ComponentLabel> = model
        .non_zero_components()
        .iter()
        .map(|c| c.label())
        .collect();
    assert_eq!(active, vec![ComponentLabel::ChipSignal]);
}

#[test]
fn test_set_pis_rejects_bad_input() {
    let mut model = build_model(0.1);
    assert!(model.set_pis(&[1.0]).is_err());
    assert!(model.set_pis(&[0.1, 0.5, -0.3, 0.0, 0.05, 0.05]).is_err());
}

#[test]
fn test_normalize_all_zero_resets_to_background() {
    let mut model = build_model(0.1);
    model.components_mut().for_each(|c| c.set_pi(0.0));
    model.normalize_pi();
    assert_eq!(model.background().pi(), 1.0);
    assert_eq!(model.non_zero_components().len(), 1);
}

#[test]
fn test_save_load_round_trip() {
    let model = build_model(0.1);
    let loaded = ProteinDnaInteractionModel::load_str(&model.save_string()).unwrap();

    assert_eq!(loaded.width(), model.width());
    assert_eq!(loaded.center_offset(), model.center_offset());
    assert_eq!(loaded.num_conditions(), model.num_conditions());
    assert_eq!(loaded.num_components(), model.num_components());
    for (a, b) in loaded.components().zip(model.components()) {
        assert_eq!(a.index(), b.index());
        assert_eq!(a.label(), b.label());
        assert_eq!(a.position(), b.position());
        assert!((a.pi() - b.pi()).abs() < 1e-12);
        assert_eq!(a.density().probabilities(), b.density().probabilities());
    }
    assert_eq!(loaded.composite_watson(), model.composite_watson());
    assert_eq!(loaded.composite_crick(), model.composite_crick());
}

#[test]
fn test_save_load_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("model.txt");
    let model = build_model(0.25);
    model.save_to_file(&path).unwrap();

    let loaded = ProteinDnaInteractionModel::load_from_file(&path).unwrap();
    assert_eq!(loaded.num_components(), model.num_components());
    assert!((loaded.pi_total() - 1.0).abs() < 1e-9);
}

#[test]
fn test_saved_layout() {
    let model = build_model(0.1);
    let text = model.save_string();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "#ProteinDNAInteractionModel,101,50,2,");
    assert!(lines[1].starts_with("#CompositeWatson,0,"));
    assert!(lines[2].starts_with("#CompositeCrick,0,"));
    assert!(lines[3].starts_with("#CompositeWatson,1,"));
    assert!(lines[4].starts_with("#CompositeCrick,1,"));
    assert_eq!(lines.iter().filter(|l| l.starts_with("#TagProbabilityDensity")).count(), 6);
    let first_component = lines
        .iter()
        .position(|l| l.starts_with("#CompositeModelComponent"))
        .unwrap();
    let last_density = lines.iter().rposition(|l| l.starts_with("#TagProbabilityDensity")).unwrap();
    assert!(first_component > last_density);
}

#[test]
fn test_unknown_lines_are_ignored() {
    let model = build_model(0.1);
    let text = format!("{}#Comment,whatever\n#AnotherTag\n", model.save_string());
    let loaded = ProteinDnaInteractionModel::load_str(&text).unwrap();
    assert_eq!(loaded.num_components(), 6);
}

#[rstest]
#[case("#ProteinDNAInteractionModel,101,50,")]
#[case("#ProteinDNAInteractionModel,101,50,2,7,")]
#[case("#SomethingElse,101,50,2,")]
#[case("#ProteinDNAInteractionModel,wide,50,2,")]
#[case("#ProteinDNAInteractionModel,18446744073709551615,0,2,")]
#[case("#ProteinDNAInteractionModel,1000000000000,50,2,")]
#[case("#ProteinDNAInteractionModel,101,50,18446744073709551615,")]
fn test_malformed_header_fails(#[case] header: &str) {
    let model = build_model(0.1);
    let saved = model.save_string();
    let text = saved.replacen("#ProteinDNAInteractionModel,101,50,2,", header, 1);
    match ProteinDnaInteractionModel::load_str(&text) {
        Err(ChexmixError::MalformedModel { line, .. }) => assert_eq!(line, 1),
        other => panic!("expected a malformed-model error, got {:?}", other.map(|m| m.width())),
    }
}

#[test]
fn test_empty_input_fails() {
    assert!(matches!(
        ProteinDnaInteractionModel::load(&[]),
        Err(ChexmixError::MalformedModel { line: 1, .. })
    ));
}

#[rstest]
#[case(",CS,", ComponentLabel::ChipSignal)]
#[case(",Back,", ComponentLabel::Background)]
fn test_missing_component_fails(#[case] marker: &str, #[case] expected: ComponentLabel) {
    let model = build_model(0.1);
    let text: String = model
        .save_string()
        .lines()
        .filter(|l| !(l.starts_with("#CompositeModelComponent") && l.contains(marker)))
        .map(|l| format!("{}\n", l))
        .collect();
    match ProteinDnaInteractionModel::load_str(&text) {
        Err(ChexmixError::MissingComponent(label)) => assert_eq!(label, expected),
        other => panic!("expected a missing-component error, got {:?}", other.map(|m| m.width())),
    }
}

#[test]
fn test_component_without_density_fails() {
    let model = build_model(0.1);
    let text: String = model
        .save_string()
        .lines()
        .filter(|l| !l.starts_with("#TagProbabilityDensity,1,"))
        .map(|l| format!("{}\n", l))
        .collect();
    // the density's data lines are now stray and ignored; the CS line has nothing to attach to
    assert!(matches!(
        ProteinDnaInteractionModel::load_str(&text),
        Err(ChexmixError::MalformedModel { .. })
    ));
}

#[test]
fn test_composite_row_out_of_range_fails() {
    let model = build_model(0.1);
    let text = format!("{}#CompositeWatson,9,1,2,3,\n", model.save_string());
    let err = ProteinDnaInteractionModel::load_str(&text).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("condition 9"), "{}", message);
}

#[test]
fn test_from_components_checks_labels() {
    let density = TagProbabilityDensity::uniform(-2, 2).unwrap();
    let back =
        CompositeModelComponent::new(density.clone(), 0, 0, ComponentLabel::Background, false);
    let not_cs = CompositeModelComponent::new(density, 0, 1, ComponentLabel::CrossLink, true);
    let result = ProteinDnaInteractionModel::from_components(
        1,
        0,
        1,
        Array2::zeros((1, 1)),
        Array2::zeros((1, 1)),
        not_cs,
        back,
        Vec::new(),
    );
    assert!(result.is_err());
}

#[test]
fn test_display_orders_cross_links() {
    let mut model = build_model(0.1);
    model.cross_links_mut()[0].set_position(60);
    model.cross_links_mut()[2].set_pi(0.0);
    let text = model.to_string();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "ProteinDNAInteractionModel:");
    // index 4 has pi 0 and is skipped; index 2 moved to the right end
    assert!(lines[1].starts_with("\t3\tXL:\tPosition:-5"));
    assert!(lines[2].starts_with("\t5\tXL:\tPosition:5"));
    assert!(lines[3].starts_with("\t2\tXL:\tPosition:10"));
    assert!(lines[4].starts_with("\t1\tCS:\tPosition:0"));
    assert!(lines[5].starts_with("\t0\tBack:\tPosition:0"));
    assert_eq!(lines.len(), 6);
}

#[test]
fn test_composite_profile_accessors() {
    let comp = composite(3);
    assert_eq!(comp.window_size(), WIDTH);
    assert_eq!(comp.num_conditions(), 3);
    assert_eq!(comp.center_offset(), CENTER);
    let profile = || Array2::<f64>::zeros((1, 5));
    assert!(CompositeTagDistribution::new(profile(), Array2::zeros((1, 4)), 2).is_err());
    assert!(CompositeTagDistribution::new(profile(), profile(), 5).is_err());
}
