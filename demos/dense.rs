use lamina_nn::{
    Dim, ExecutionContext, LayerSpec, Tensor, Topology, DEFAULT_EVAL_BUDGET,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut ctx = ExecutionContext::with_seed(142857);

    let mut net = Topology::new();
    net.add(&mut ctx, &LayerSpec::new("sigmoid").with_shape(2, 8))?;
    net.add(&mut ctx, &LayerSpec::new("relu").with_output(8))?;
    net.add(&mut ctx, &LayerSpec::new("sigmoid").with_output(3))?;
    net.add(&mut ctx, &LayerSpec::new("cross_entropy"))?;

    println!("{}", net.describe());
    assert_eq!(net.current_dimension(), Some(Dim::Flat(3)));

    let inputs = Tensor::from_rows(vec![
        vec![0.0, 0.0],
        vec![0.0, 1.0],
        vec![1.0, 0.0],
        vec![1.0, 1.0],
    ]);
    let outputs = net.predict(&ctx, &inputs, DEFAULT_EVAL_BUDGET)?;
    println!("prediction shape: {:?}", outputs.shape);

    let labels = Tensor::from_rows(vec![
        vec![1.0, 0.0, 0.0],
        vec![0.0, 1.0, 0.0],
        vec![0.0, 1.0, 0.0],
        vec![0.0, 0.0, 1.0],
    ]);
    println!("initial loss: {:.6}", net.cost(&ctx, &inputs, &labels)?);

    // The build record replays into an identically shaped topology.
    let spec = net.to_spec("dense-demo");
    let rebuilt = spec.rebuild(&mut ctx)?;
    assert_eq!(rebuilt.len(), net.len());
    println!("replayed {} layers from the build record", rebuilt.len());
    Ok(())
}
