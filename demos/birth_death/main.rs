use momentfit::prelude::*;

/// Birth-death process `0 -> X` at rate `k1`, `X -> 0` at rate `k2 X`
///
/// Both reactions are at most first order, so the mean and variance equations close exactly.
fn birth_death(_t: T, y: &State, p: &[T], dy: &mut State) {
    let (k1, k2) = (p[0], p[1]);
    dy[0] = k1 - k2 * y[0];
    dy[1] = k1 + k2 * y[0] - 2.0 * k2 * y[1];
}

fn main() -> eyre::Result<()> {
    let model = MomentModel::new(
        birth_death,
        vec![Moment::new("y_0", vec![1]), Moment::new("yx1", vec![2])],
        vec!["k1".to_string(), "k2".to_string()],
    );
    let settings = read_settings("demos/birth_death/settings.toml")?;

    let report = fit(&model, &settings)?;
    let best = report.best();
    println!(
        "k1 = {:.3}, k2 = {:.3} (objective {:.4}, {} of {} starts failed)",
        best.parameters[0],
        best.parameters[1],
        best.objective,
        report.n_failed(),
        report.ranked.len()
    );

    simulate(&model, &settings)?;
    Ok(())
}
