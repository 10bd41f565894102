//! Evaluation-time properties of the forward composer: terminal special
//! cases, flatten boundaries, pipe concatenation order, batching
//! transparency, and data-dependent error reporting.

use lamina_nn::{
    Activation, Bindings, Dim, ExecutionContext, Expr, Layer, LayerSpec, NetError, Tensor,
    Topology, DEFAULT_EVAL_BUDGET,
};

fn ctx() -> ExecutionContext {
    ExecutionContext::with_seed(142857)
}

fn param(net: &Topology, ctx: &ExecutionContext, i: usize) -> (Tensor, Tensor) {
    let w = net.weights()[i].param().unwrap();
    let b = net.bias()[i].param().unwrap();
    (ctx.param(w).clone(), ctx.param(b).clone())
}

// ===========================================================================
// Terminal special cases
// ===========================================================================

#[test]
fn prediction_skips_the_last_nonlinearity_without_a_terminal_cost() {
    let mut ctx = ctx();
    let mut net = Topology::new();
    net.add(&mut ctx, &LayerSpec::new("sigmoid").with_shape(2, 3)).unwrap();
    net.add(&mut ctx, &LayerSpec::new("sigmoid").with_output(2)).unwrap();

    let x = Tensor::from_rows(vec![vec![0.5, -1.0], vec![2.0, 0.25]]);
    let out = net.predict(&ctx, &x, DEFAULT_EVAL_BUDGET).unwrap();

    let (w0, b0) = param(&net, &ctx, 0);
    let (w1, b1) = param(&net, &ctx, 1);
    let hidden = x
        .matmul(&w0)
        .unwrap()
        .add_bias(&b0)
        .unwrap()
        .map(|v| Activation::Sigmoid.apply(v));
    let expected = hidden.matmul(&w1).unwrap().add_bias(&b1).unwrap();
    assert_eq!(out, expected);
}

#[test]
fn terminal_cost_layer_passes_the_carried_activation_through() {
    let mut ctx = ctx();
    let mut net = Topology::new();
    net.add(&mut ctx, &LayerSpec::new("sigmoid").with_shape(2, 3)).unwrap();
    net.add(&mut ctx, &LayerSpec::new("sigmoid").with_output(2)).unwrap();
    net.add(&mut ctx, &LayerSpec::new("cross_entropy")).unwrap();

    let x = Tensor::from_rows(vec![vec![0.5, -1.0]]);
    let out = net.predict(&ctx, &x, DEFAULT_EVAL_BUDGET).unwrap();

    let (w0, b0) = param(&net, &ctx, 0);
    let (w1, b1) = param(&net, &ctx, 1);
    let expected = x
        .matmul(&w0)
        .unwrap()
        .add_bias(&b0)
        .unwrap()
        .map(|v| Activation::Sigmoid.apply(v))
        .matmul(&w1)
        .unwrap()
        .add_bias(&b1)
        .unwrap()
        .map(|v| Activation::Sigmoid.apply(v));
    assert_eq!(out, expected);
}

#[test]
fn labeled_composition_yields_a_scalar_objective() {
    let mut ctx = ctx();
    let net = Topology::from_units(&mut ctx, &[2, 4, 3]).unwrap();
    let x = Tensor::from_rows(vec![vec![0.0, 1.0], vec![1.0, 0.0]]);
    let y = Tensor::from_rows(vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]);
    let loss = net.cost(&ctx, &x, &y).unwrap();
    assert!(loss.is_finite());
    assert!(loss > 0.0);
}

// ===========================================================================
// Flatten boundary and convolutional forward evaluation
// ===========================================================================

#[test]
fn conv_to_dense_flattens_the_feature_map() {
    let mut ctx = ctx();
    let mut net = Topology::new();
    net.add(
        &mut ctx,
        &LayerSpec::new("conv_relu")
            .with_input_map(1, 6, 6)
            .with_kernel(3, 3)
            .with_filters(8),
    )
    .unwrap();
    net.add(&mut ctx, &LayerSpec::new("conv_relu").with_kernel(3, 3).with_filters(16)).unwrap();
    net.add(&mut ctx, &LayerSpec::new("sigmoid").with_output(10)).unwrap();

    let input = Tensor::zeros(&[2, 6, 6, 1]);
    let out = net.predict(&ctx, &input, DEFAULT_EVAL_BUDGET).unwrap();
    assert_eq!(out.shape, vec![2, 10]);
}

#[test]
fn pooling_shrinks_the_map_before_the_dense_layer() {
    let mut ctx = ctx();
    let mut net = Topology::new();
    net.add(
        &mut ctx,
        &LayerSpec::new("conv_tanh")
            .with_input_map(1, 4, 4)
            .with_kernel(3, 3)
            .with_filters(2),
    )
    .unwrap();
    net.add(&mut ctx, &LayerSpec::new("avg_pool").with_kernel(2, 2)).unwrap();
    net.add(&mut ctx, &LayerSpec::new("sigmoid").with_output(3)).unwrap();
    net.add(&mut ctx, &LayerSpec::new("mse")).unwrap();

    assert_eq!(net.layers()[1].out_dim().unwrap(), Dim::map(2, 2, 2));
    let out = net.predict(&ctx, &Tensor::zeros(&[1, 4, 4, 1]), DEFAULT_EVAL_BUDGET).unwrap();
    assert_eq!(out.shape, vec![1, 3]);
}

// ===========================================================================
// Pipe evaluation
// ===========================================================================

#[test]
fn pipe_concatenates_branch_outputs_in_index_order() {
    let mut ctx = ctx();
    let mut net = Topology::new();
    net.add(
        &mut ctx,
        &LayerSpec::new("conv_identity")
            .with_input_map(1, 2, 2)
            .with_kernel(1, 1)
            .with_filters(1),
    )
    .unwrap();
    net.add(&mut ctx, &LayerSpec::pipe(2)).unwrap();
    net.add_pipe_layer(
        &mut ctx,
        0,
        &LayerSpec::new("conv_identity").with_kernel(1, 1).with_filters(1),
    )
    .unwrap();
    net.add_pipe_layer(
        &mut ctx,
        1,
        &LayerSpec::new("conv_identity").with_kernel(1, 1).with_filters(2),
    )
    .unwrap();

    // Pin every parameter so each branch writes a recognizable constant.
    let (base_w, base_b) = (net.weights()[0].param().unwrap(), net.bias()[0].param().unwrap());
    ctx.param_mut(base_w).data = vec![1.0];
    ctx.param_mut(base_b).data = vec![0.0];
    let Layer::Pipe(pipe) = net.layers().last().unwrap() else {
        panic!("last layer should be a pipe");
    };
    let ids: Vec<_> = (0..2)
        .map(|i| {
            let branch = pipe.branch(i).unwrap();
            (branch.weights()[0].param().unwrap(), branch.bias()[0].param().unwrap())
        })
        .collect();
    ctx.param_mut(ids[0].0).data = vec![2.0];
    ctx.param_mut(ids[0].1).data = vec![0.0];
    ctx.param_mut(ids[1].0).data = vec![3.0, 4.0];
    ctx.param_mut(ids[1].1).data = vec![0.0, 0.0];

    let expr = net.compose(Expr::Input, None, true).unwrap();
    let input = Tensor::filled(&[1, 2, 2, 1], 1.0);
    let out = ctx.evaluate(&expr, &Bindings::input_only(&input)).unwrap();

    assert_eq!(out.shape, vec![1, 2, 2, 3]);
    // Channel segment k belongs to branch k, at every pixel.
    for pixel in out.data.chunks(3) {
        assert_eq!(pixel, &[2.0, 3.0, 4.0]);
    }
}

#[test]
fn pipe_feeds_a_dense_layer_after_concatenation() {
    let mut ctx = ctx();
    let mut net = Topology::new();
    net.add(
        &mut ctx,
        &LayerSpec::new("conv_relu")
            .with_input_map(1, 4, 4)
            .with_kernel(3, 3)
            .with_filters(4),
    )
    .unwrap();
    net.add(&mut ctx, &LayerSpec::pipe(2)).unwrap();
    net.add_pipe_layer(&mut ctx, 0, &LayerSpec::new("conv_relu").with_kernel(1, 1).with_filters(4))
        .unwrap();
    net.add_pipe_layer(&mut ctx, 1, &LayerSpec::new("conv_tanh").with_kernel(3, 3).with_filters(6))
        .unwrap();
    net.add(&mut ctx, &LayerSpec::new("sigmoid").with_output(5)).unwrap();
    net.add(&mut ctx, &LayerSpec::new("cross_entropy")).unwrap();

    let out = net.predict(&ctx, &Tensor::zeros(&[3, 4, 4, 1]), DEFAULT_EVAL_BUDGET).unwrap();
    assert_eq!(out.shape, vec![3, 5]);
}

// ===========================================================================
// Batched prediction
// ===========================================================================

#[test]
fn batched_prediction_is_numerically_transparent() {
    let mut ctx = ctx();
    let net = Topology::from_units(&mut ctx, &[2, 6, 3]).unwrap();
    let x = Tensor::from_rows(vec![
        vec![0.0, 0.1],
        vec![0.2, 0.3],
        vec![0.4, 0.5],
        vec![0.6, 0.7],
        vec![0.8, 0.9],
    ]);
    let whole = net.predict(&ctx, &x, DEFAULT_EVAL_BUDGET).unwrap();
    // A budget of 4 elements with 2-wide rows forces 2-row batches.
    let batched = net.predict(&ctx, &x, 4).unwrap();
    assert_eq!(whole, batched);
    // Even one row at a time.
    let tiny = net.predict(&ctx, &x, 1).unwrap();
    assert_eq!(whole, tiny);
}

#[test]
fn rank_one_inputs_are_promoted_to_a_single_row() {
    let mut ctx = ctx();
    let net = Topology::from_units(&mut ctx, &[2, 4, 3]).unwrap();
    let row = Tensor::from_parts(&[2], vec![0.3, 0.7]).unwrap();
    let out = net.predict(&ctx, &row, DEFAULT_EVAL_BUDGET).unwrap();
    assert_eq!(out.shape, vec![1, 3]);
    assert_eq!(net.predict_classes(&ctx, &row, DEFAULT_EVAL_BUDGET).unwrap().len(), 1);
}

// ===========================================================================
// Data-dependent errors
// ===========================================================================

#[test]
fn label_width_mismatch_fails_at_evaluation_time() {
    let mut ctx = ctx();
    let net = Topology::from_units(&mut ctx, &[2, 4, 3]).unwrap();
    let x = Tensor::from_rows(vec![vec![0.0, 1.0]]);
    let bad_y = Tensor::from_rows(vec![vec![1.0, 0.0]]);
    let err = net.cost(&ctx, &x, &bad_y).unwrap_err();
    assert!(matches!(err, NetError::BuildNetwork(_)));
}

#[test]
fn missing_label_binding_is_reported() {
    let mut ctx = ctx();
    let net = Topology::from_units(&mut ctx, &[2, 4, 3]).unwrap();
    let expr = net.compose(Expr::Input, Some(Expr::Label), false).unwrap();
    let x = Tensor::from_rows(vec![vec![0.0, 1.0]]);
    let err = ctx.evaluate(&expr, &Bindings::input_only(&x)).unwrap_err();
    assert!(matches!(err, NetError::BuildNetwork(_)));
}

#[test]
fn composing_an_empty_topology_is_a_network_error() {
    let net = Topology::new();
    assert!(matches!(
        net.compose(Expr::Input, None, false),
        Err(NetError::BuildNetwork(_))
    ));
}

// ===========================================================================
// Diagnostics
// ===========================================================================

#[test]
fn compose_all_exposes_one_value_per_layer_and_restarts_cleanly() {
    let mut ctx = ctx();
    let mut net = Topology::new();
    net.add(&mut ctx, &LayerSpec::new("sigmoid").with_shape(2, 4)).unwrap();
    net.add(&mut ctx, &LayerSpec::new("dropout")).unwrap();
    net.add(&mut ctx, &LayerSpec::new("sigmoid").with_output(3)).unwrap();
    net.add(&mut ctx, &LayerSpec::new("cross_entropy")).unwrap();

    let x = Tensor::from_rows(vec![vec![0.25, -0.5]]);
    let first = net.compose_all(Expr::Input).unwrap();
    assert_eq!(first.len(), net.len());

    let bindings = Bindings::input_only(&x);
    let values: Vec<_> = first
        .iter()
        .map(|e| ctx.evaluate(e, &bindings).unwrap())
        .collect();
    // Dropout is a pure pass-through at evaluation time.
    assert_eq!(values[1], values[0]);
    // The terminal cost slot passes the previous activation through.
    assert_eq!(values[3], values[2]);

    // Restartable: a second composition evaluates identically.
    let second = net.compose_all(Expr::Input).unwrap();
    let again: Vec<_> = second
        .iter()
        .map(|e| ctx.evaluate(e, &bindings).unwrap())
        .collect();
    assert_eq!(values, again);
}

#[test]
fn seeded_builds_predict_identically() {
    let build = || {
        let mut ctx = ExecutionContext::with_seed(9001);
        let net = Topology::from_units(&mut ctx, &[3, 5, 2]).unwrap();
        (ctx, net)
    };
    let (ctx_a, net_a) = build();
    let (ctx_b, net_b) = build();
    let x = Tensor::from_rows(vec![vec![0.1, 0.2, 0.3]]);
    assert_eq!(
        net_a.predict(&ctx_a, &x, DEFAULT_EVAL_BUDGET).unwrap(),
        net_b.predict(&ctx_b, &x, DEFAULT_EVAL_BUDGET).unwrap()
    );
}
